use thiserror::Error;

pub type Result<T> = std::result::Result<T, VideoSearchError>;

#[derive(Error, Debug)]
pub enum VideoSearchError {
    #[error("Storage error: {0}")]
    Storage(#[from] database::StorageError),

    #[error("Processing error: {0}")]
    Processing(#[from] indexer::ProcessingError),

    #[error("Model error: {0}")]
    Model(#[from] models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod indexer;
pub mod library;
pub mod models;
pub mod video;

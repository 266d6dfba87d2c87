// Database module
// Durable vector collection keyed by video path, backed by LanceDB

pub mod lancedb;

use thiserror::Error;

pub use lancedb::vector_store::{QueryMatch, VectorStore};
pub use lancedb::{UPLOAD_TIME_FORMAT, VideoMetadata, VideoRecord, filename_of, summary_preview};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection schema mismatch: {0}")]
    Schema(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Models module
// Captioning and text embedding capabilities backed by an Ollama server

pub mod caption;
pub mod ollama;

use thiserror::Error;

use crate::video::Frame;

pub use caption::{CAPTION_QUESTION, clean_caption, encode_frame_png};
pub use ollama::{ModelInfo, OllamaClient};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode frame for captioning: {0}")]
    FrameEncoding(String),

    #[error("Model returned an empty embedding")]
    EmptyEmbedding,

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Describes a single decoded frame in natural language.
///
/// Implementations hold heavyweight model state; build one and share it by reference.
/// Captions depend only on the frame, never on previously captioned frames.
pub trait FrameCaptioner: Send + Sync {
    fn caption(&self, frame: &Frame) -> Result<String, ModelError>;
}

/// Maps text to a fixed-dimension vector.
///
/// Summaries and queries must go through the same embedder for distances to be
/// meaningful. Output for a given model and input is deterministic.
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

// Indexer module
// Turns a video file into a textual summary and the embedding of that summary

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{FrameCaptioner, ModelError, TextEmbedder};
use crate::video::{DecodeError, FrameSampler, ProgressCallback, VideoDecoder};

#[cfg(test)]
mod tests;

/// Separator placed between consecutive frame captions
pub const CAPTION_SEPARATOR: &str = ". ";

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Model failed while processing {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("Could not embed the empty summary of {path}: {source}")]
    EmptySummary {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("Invalid sampling interval: {0} (must be a positive number of seconds)")]
    InvalidInterval(f64),
}

/// The searchable representation of one video
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVideo {
    pub summary: String,
    /// Embedding of `summary`, never of anything else
    pub embedding: Vec<f32>,
    pub frames_captioned: usize,
}

/// Join per-frame captions, in frame order, into one summary
#[inline]
pub fn synthesize_summary<S: AsRef<str>>(captions: &[S]) -> String {
    captions
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CAPTION_SEPARATOR)
}

/// Runs sampling, captioning, summary synthesis and embedding for one video at a time.
///
/// Frames are captioned one by one in temporal order. Nothing is retried; the
/// caller decides what to do with a failed video.
#[derive(Clone, Copy)]
pub struct VideoIndexer<'a> {
    decoder: &'a dyn VideoDecoder,
    captioner: &'a dyn FrameCaptioner,
    embedder: &'a dyn TextEmbedder,
}

impl<'a> VideoIndexer<'a> {
    #[inline]
    pub fn new(
        decoder: &'a dyn VideoDecoder,
        captioner: &'a dyn FrameCaptioner,
        embedder: &'a dyn TextEmbedder,
    ) -> Self {
        Self {
            decoder,
            captioner,
            embedder,
        }
    }

    #[inline]
    pub fn embedder(&self) -> &'a dyn TextEmbedder {
        self.embedder
    }

    /// Produce the summary and embedding for `path`.
    ///
    /// Blocks while frames are decoded and captioned. The decoder is released
    /// before this returns, on success and on failure.
    #[inline]
    pub fn process(
        &self,
        path: &Path,
        interval_secs: f64,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<IndexedVideo, ProcessingError> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(ProcessingError::InvalidInterval(interval_secs));
        }

        let sampler = FrameSampler::new(self.decoder);
        let frames = sampler.sample(path, interval_secs, progress)?;

        let mut captions = Vec::new();
        for frame in frames {
            let frame = frame?;
            let caption =
                self.captioner
                    .caption(&frame.image)
                    .map_err(|source| ProcessingError::Model {
                        path: path.to_path_buf(),
                        source,
                    })?;
            debug!(
                "Frame {} ({:.2}s): {}",
                frame.index, frame.timestamp_secs, caption
            );
            captions.push(caption);
        }

        let summary = synthesize_summary(&captions);
        debug!(
            "Summary of {} has {} characters from {} captions",
            path.display(),
            summary.len(),
            captions.len()
        );

        let embedding = self.embedder.embed(&summary).map_err(|source| {
            if summary.is_empty() {
                ProcessingError::EmptySummary {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                ProcessingError::Model {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(ProcessingError::Model {
                path: path.to_path_buf(),
                source: ModelError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                },
            });
        }

        info!(
            "Processed {} ({} frames captioned, {} dimensions)",
            path.display(),
            captions.len(),
            embedding.len()
        );

        Ok(IndexedVideo {
            summary,
            embedding,
            frames_captioned: captions.len(),
        })
    }
}

// LanceDB vector database module
// Record and metadata types stored alongside each video embedding


pub mod vector_store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Format of `upload_time`, local time
pub const UPLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PREVIEW_ELLIPSIS: &str = "...";

/// Keys owned by the store; pass-through fields may not shadow them
const RESERVED_KEYS: [&str; 4] = ["upload_time", "path", "filename", "summary_preview"];

/// Display metadata kept next to each vector.
///
/// Listing only ever reads these columns, never the vector or the full summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// When the video was indexed, formatted with [`UPLOAD_TIME_FORMAT`]
    pub upload_time: String,
    pub path: String,
    /// Basename of `path`
    pub filename: String,
    /// First characters of the summary followed by an ellipsis
    pub summary_preview: String,
    /// Opaque pass-through fields supplied by the caller
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoMetadata {
    /// Metadata for a video indexed right now
    #[inline]
    pub fn for_video(path: &str, summary: &str, preview_chars: usize) -> Self {
        Self {
            upload_time: chrono::Local::now().format(UPLOAD_TIME_FORMAT).to_string(),
            path: path.to_string(),
            filename: filename_of(path),
            summary_preview: summary_preview(summary, preview_chars),
            extra: Map::new(),
        }
    }

    /// Attach a pass-through field. Reserved keys are ignored.
    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !RESERVED_KEYS.contains(&key) {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }
}

/// A complete stored record, including the vector and full summary
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub path: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub metadata: VideoMetadata,
}

/// First `max_chars` characters of `summary` plus an ellipsis marker
#[inline]
pub fn summary_preview(summary: &str, max_chars: usize) -> String {
    let mut preview: String = summary.chars().take(max_chars).collect();
    preview.push_str(PREVIEW_ELLIPSIS);
    preview
}

/// Display name of a stored path: its final component, or the path itself
#[inline]
pub fn filename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |name| name.to_string_lossy().into_owned())
}

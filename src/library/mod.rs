// Library module
// Entry points composing the indexing pipeline, the vector store and the query path


use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_PREVIEW_CHARS;
use crate::database::{QueryMatch, StorageError, VectorStore, VideoMetadata};
use crate::indexer::{ProcessingError, VideoIndexer};
use crate::video::ProgressCallback;

/// A searchable collection of videos.
///
/// Holds the store and borrows the already initialized model capabilities.
pub struct VideoLibrary<'a> {
    indexer: VideoIndexer<'a>,
    store: VectorStore,
    preview_chars: usize,
}

impl<'a> VideoLibrary<'a> {
    #[inline]
    pub fn new(indexer: VideoIndexer<'a>, store: VectorStore) -> Self {
        Self {
            indexer,
            store,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Index one video and store it under its path.
    ///
    /// `Err` means this video could not be turned into a summary and embedding.
    /// `Ok(false)` means the store rejected the write; the failure has been logged.
    #[inline]
    pub async fn process_and_index(
        &self,
        path: &Path,
        interval_secs: f64,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<bool, ProcessingError> {
        self.process_and_index_with(path, interval_secs, progress, Map::new())
            .await
    }

    /// Like [`Self::process_and_index`], storing `fields` as pass-through metadata
    #[inline]
    pub async fn process_and_index_with(
        &self,
        path: &Path,
        interval_secs: f64,
        progress: Option<ProgressCallback<'_>>,
        fields: Map<String, Value>,
    ) -> Result<bool, ProcessingError> {
        let indexed = self.indexer.process(path, interval_secs, progress)?;

        let key = path.to_string_lossy();
        let metadata = fields.into_iter().fold(
            VideoMetadata::for_video(&key, &indexed.summary, self.preview_chars),
            |metadata, (field, value)| metadata.with_field(&field, value),
        );

        let stored = self
            .store
            .upsert(&key, &indexed.summary, &indexed.embedding, &metadata)
            .await;
        if !stored {
            warn!("{} was processed but could not be stored", key);
        }
        Ok(stored)
    }

    /// Rank stored videos against free text, closest first.
    ///
    /// Returns `None` when nothing has been indexed yet.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> crate::Result<Option<Vec<QueryMatch>>> {
        if self.store.count().await? == 0 {
            debug!("Search for {:?} against an empty library", query);
            return Ok(None);
        }

        let embedding = self.indexer.embedder().embed(query)?;
        let matches = self.store.query(&embedding, k).await?;

        if let Some(found) = &matches {
            info!("Search for {:?} returned {} results", query, found.len());
        }
        Ok(matches)
    }

    /// Display metadata of every indexed video
    #[inline]
    pub async fn list_indexed(&self) -> Result<Vec<VideoMetadata>, StorageError> {
        self.store.list_all().await
    }

    #[inline]
    pub async fn remove(&self, path: &str) -> Result<bool, StorageError> {
        self.store.remove(path).await
    }

    #[inline]
    pub async fn count(&self) -> Result<usize, StorageError> {
        self.store.count().await
    }
}


use super::{VideoMetadata, VideoRecord};
use crate::config::Config;
use crate::database::StorageError;
use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const ID_COLUMN: &str = "id";
const VECTOR_COLUMN: &str = "vector";
const SUMMARY_COLUMN: &str = "summary";
const FILENAME_COLUMN: &str = "filename";
const PREVIEW_COLUMN: &str = "summary_preview";
const UPLOAD_TIME_COLUMN: &str = "upload_time";
const EXTRA_COLUMN: &str = "extra";
const SEQ_COLUMN: &str = "seq";
const DISTANCE_COLUMN: &str = "_distance";

const METADATA_COLUMNS: [&str; 6] = [
    ID_COLUMN,
    FILENAME_COLUMN,
    PREVIEW_COLUMN,
    UPLOAD_TIME_COLUMN,
    EXTRA_COLUMN,
    SEQ_COLUMN,
];

/// Persistent vector collection keyed by video path.
///
/// Ranking uses cosine distance, ties broken by insertion order.
/// Writes through one instance are serialized; the mutex also owns the
/// next insertion sequence number.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    write_lock: Mutex<u64>,
}

/// One ranked hit of a nearest-neighbor query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub path: String,
    /// Cosine distance to the query vector, lower is closer
    pub distance: f32,
    pub summary: String,
    pub metadata: VideoMetadata,
}

/// Row decoded from a result batch, before it is shaped for the caller
struct StoredRow {
    path: String,
    seq: u64,
    summary: Option<String>,
    vector: Option<Vec<f32>>,
    distance: Option<f32>,
    metadata: VideoMetadata,
}

impl VectorStore {
    /// Open (or create) the collection configured for this installation
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, StorageError> {
        Self::open(
            &config.vector_database_path(),
            &config.store.table_name,
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Open the collection `table_name` under `db_path`, creating it when missing.
    ///
    /// An existing collection must have exactly the expected columns and
    /// vector dimension.
    #[inline]
    pub async fn open(
        db_path: &Path,
        table_name: &str,
        dimension: usize,
    ) -> Result<Self, StorageError> {
        if dimension == 0 {
            return Err(StorageError::Schema(
                "vector dimension must be positive".to_string(),
            ));
        }

        debug!("Initializing LanceDB at path: {:?}", db_path);
        std::fs::create_dir_all(db_path).map_err(|e| {
            StorageError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().into_owned();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
            write_lock: Mutex::new(0),
        };

        let next_seq = store.initialize_table().await?;
        *store.write_lock.lock().await = next_seq;

        info!(
            "Vector store '{}' ready ({} dimensions)",
            store.table_name, store.dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Create the table if missing, otherwise verify its schema.
    /// Returns the next free insertion sequence number.
    async fn initialize_table(&self) -> Result<u64, StorageError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            info!(
                "Creating table '{}' with {} dimensions",
                self.table_name, self.dimension
            );
            self.connection
                .create_empty_table(&self.table_name, self.schema())
                .execute()
                .await
                .map_err(|e| StorageError::Database(format!("Failed to create table: {}", e)))?;
            return Ok(0);
        }

        let table = self.open_table().await?;
        let existing = table
            .schema()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to get table schema: {}", e)))?;
        self.verify_schema(&existing)?;

        let rows = self.scan(&table, &[SEQ_COLUMN]).await?;
        let next_seq = rows.iter().map(|row| row.seq + 1).max().unwrap_or(0);
        debug!(
            "Opened existing table '{}' with {} records",
            self.table_name,
            rows.len()
        );
        Ok(next_seq)
    }

    fn verify_schema(&self, existing: &Schema) -> Result<(), StorageError> {
        let expected = self.schema();

        for field in expected.fields() {
            let Ok(found) = existing.field_with_name(field.name()) else {
                return Err(StorageError::Schema(format!(
                    "table '{}' has no column '{}'",
                    self.table_name,
                    field.name()
                )));
            };

            if field.name() == VECTOR_COLUMN {
                match found.data_type() {
                    DataType::FixedSizeList(_, size) if *size as usize == self.dimension => {}
                    DataType::FixedSizeList(_, size) => {
                        return Err(StorageError::DimensionMismatch {
                            expected: self.dimension,
                            actual: *size as usize,
                        });
                    }
                    other => {
                        return Err(StorageError::Schema(format!(
                            "column 'vector' has type {:?}",
                            other
                        )));
                    }
                }
            } else if found.data_type() != field.data_type() {
                return Err(StorageError::Schema(format!(
                    "column '{}' has type {:?}, expected {:?}",
                    field.name(),
                    found.data_type(),
                    field.data_type()
                )));
            }
        }

        if existing.fields().len() != expected.fields().len() {
            return Err(StorageError::Schema(format!(
                "table '{}' has {} columns, expected {}",
                self.table_name,
                existing.fields().len(),
                expected.fields().len()
            )));
        }

        Ok(())
    }

    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new(ID_COLUMN, DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new(SUMMARY_COLUMN, DataType::Utf8, false),
            Field::new(FILENAME_COLUMN, DataType::Utf8, false),
            Field::new(PREVIEW_COLUMN, DataType::Utf8, false),
            Field::new(UPLOAD_TIME_COLUMN, DataType::Utf8, false),
            Field::new(EXTRA_COLUMN, DataType::Utf8, false),
            Field::new(SEQ_COLUMN, DataType::UInt64, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table, StorageError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to open table: {}", e)))
    }

    /// Insert or fully replace the record for `path`.
    ///
    /// Failures are logged and reported as `false` so a batch can move on.
    #[inline]
    pub async fn upsert(
        &self,
        path: &str,
        summary: &str,
        embedding: &[f32],
        metadata: &VideoMetadata,
    ) -> bool {
        match self.try_upsert(path, summary, embedding, metadata).await {
            Ok(()) => {
                info!("Stored {} ({} dimensions)", path, embedding.len());
                true
            }
            Err(e) => {
                error!("Failed to store {}: {}", path, e);
                false
            }
        }
    }

    /// Insert or fully replace the record for `path` as a single commit
    #[inline]
    pub async fn try_upsert(
        &self,
        path: &str,
        summary: &str,
        embedding: &[f32],
        metadata: &VideoMetadata,
    ) -> Result<(), StorageError> {
        self.validate_record(path, embedding, metadata)?;

        let extra = serde_json::to_string(&metadata.extra)
            .map_err(|e| StorageError::InvalidRecord(format!("Unserializable metadata: {}", e)))?;

        let mut next_seq = self.write_lock.lock().await;
        let batch = self.record_batch(path, summary, embedding, metadata, &extra, *next_seq)?;

        let table = self.open_table().await?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&[ID_COLUMN]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| StorageError::Database(format!("Failed to upsert {}: {}", path, e)))?;

        *next_seq += 1;
        Ok(())
    }

    fn validate_record(
        &self,
        path: &str,
        embedding: &[f32],
        metadata: &VideoMetadata,
    ) -> Result<(), StorageError> {
        if path.is_empty() {
            return Err(StorageError::InvalidRecord("path is empty".to_string()));
        }
        if metadata.path != path {
            return Err(StorageError::InvalidRecord(format!(
                "metadata path '{}' does not match '{}'",
                metadata.path, path
            )));
        }
        if embedding.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(StorageError::InvalidRecord(
                "embedding contains non-finite values".to_string(),
            ));
        }
        if is_zero_vector(embedding) {
            return Err(StorageError::InvalidRecord(
                "embedding has zero norm and no cosine distance".to_string(),
            ));
        }
        Ok(())
    }

    fn record_batch(
        &self,
        path: &str,
        summary: &str,
        embedding: &[f32],
        metadata: &VideoMetadata,
        extra: &str,
        seq: u64,
    ) -> Result<RecordBatch, StorageError> {
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(embedding.to_vec())),
            None,
        )
        .map_err(|e| StorageError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![path])),
            Arc::new(vector_array),
            Arc::new(StringArray::from(vec![summary])),
            Arc::new(StringArray::from(vec![metadata.filename.as_str()])),
            Arc::new(StringArray::from(vec![metadata.summary_preview.as_str()])),
            Arc::new(StringArray::from(vec![metadata.upload_time.as_str()])),
            Arc::new(StringArray::from(vec![extra])),
            Arc::new(UInt64Array::from(vec![seq])),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| StorageError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Up to `k` records closest to `query_embedding`, nearest first.
    ///
    /// Returns `None` when the collection is empty.
    #[inline]
    pub async fn query(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Option<Vec<QueryMatch>>, StorageError> {
        if query_embedding.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }
        if query_embedding.iter().any(|v| !v.is_finite()) || is_zero_vector(query_embedding) {
            return Err(StorageError::InvalidQuery(
                "query vector must be finite with a non-zero norm".to_string(),
            ));
        }

        let table = self.open_table().await?;
        let total = Self::count_rows(&table).await?;
        if total == 0 {
            debug!("Query against empty collection");
            return Ok(None);
        }
        if k == 0 {
            return Ok(Some(Vec::new()));
        }

        // Fetch every row so equal distances can be ordered by insertion sequence.
        // Query cost is linear in the number of stored videos.
        let results = table
            .vector_search(query_embedding)
            .map_err(|e| StorageError::Database(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&[
                ID_COLUMN,
                SUMMARY_COLUMN,
                FILENAME_COLUMN,
                PREVIEW_COLUMN,
                UPLOAD_TIME_COLUMN,
                EXTRA_COLUMN,
                SEQ_COLUMN,
            ]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to execute search: {}", e)))?;

        let mut rows = Self::collect_rows(results).await?;
        rows.sort_by(|a, b| {
            sortable_distance(a.distance)
                .total_cmp(&sortable_distance(b.distance))
                .then(a.seq.cmp(&b.seq))
        });
        rows.truncate(k);

        let matches: Vec<QueryMatch> = rows
            .into_iter()
            .map(|row| QueryMatch {
                path: row.path,
                distance: sortable_distance(row.distance),
                summary: row.summary.unwrap_or_default(),
                metadata: row.metadata,
            })
            .collect();

        debug!("Query returned {} of {} records", matches.len(), total);
        Ok(Some(matches))
    }

    /// Metadata for every stored video, in insertion order
    #[inline]
    pub async fn list_all(&self) -> Result<Vec<VideoMetadata>, StorageError> {
        let table = self.open_table().await?;
        let mut rows = self.scan(&table, &METADATA_COLUMNS).await?;
        rows.sort_by_key(|row| row.seq);

        debug!("Listed {} records", rows.len());
        Ok(rows.into_iter().map(|row| row.metadata).collect())
    }

    #[inline]
    pub async fn count(&self) -> Result<usize, StorageError> {
        let table = self.open_table().await?;
        Self::count_rows(&table).await
    }

    /// The full record stored for `path`, if any
    #[inline]
    pub async fn get(&self, path: &str) -> Result<Option<VideoRecord>, StorageError> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(id_predicate(path))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to execute lookup: {}", e)))?;

        let rows = Self::collect_rows(results).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let embedding = row.vector.ok_or_else(|| {
            StorageError::Database(format!("Record {} has no vector", row.path))
        })?;

        Ok(Some(VideoRecord {
            path: row.path,
            summary: row.summary.unwrap_or_default(),
            embedding,
            metadata: row.metadata,
        }))
    }

    /// Delete the record for `path`. Returns whether a record was removed.
    #[inline]
    pub async fn remove(&self, path: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let table = self.open_table().await?;
        let predicate = id_predicate(path);

        let matching = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StorageError::Database(format!("Failed to count rows: {}", e)))?;
        if matching == 0 {
            debug!("Nothing stored for {}", path);
            return Ok(false);
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to delete {}: {}", path, e)))?;

        info!("Removed {}", path);
        Ok(true)
    }

    /// Compact data files and prune old versions
    #[inline]
    pub async fn optimize(&self) -> Result<(), StorageError> {
        debug!("Optimizing vector database");
        let _guard = self.write_lock.lock().await;
        let table = self.open_table().await?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    async fn count_rows(table: &Table) -> Result<usize, StorageError> {
        table
            .count_rows(None)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Read `columns` of every row
    async fn scan(&self, table: &Table, columns: &[&str]) -> Result<Vec<StoredRow>, StorageError> {
        let total = Self::count_rows(table).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .query()
            .select(Select::columns(columns))
            .limit(total)
            .execute()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to scan table: {}", e)))?;

        Self::collect_rows(results).await
    }

    async fn collect_rows(
        mut results: SendableRecordBatchStream,
    ) -> Result<Vec<StoredRow>, StorageError> {
        let mut rows = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StorageError::Database(format!("Failed to read result stream: {}", e)))?
        {
            rows.extend(parse_batch(&batch)?);
        }

        Ok(rows)
    }
}

fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

/// Missing or NaN distances sort after every real distance
fn sortable_distance(distance: Option<f32>) -> f32 {
    match distance {
        Some(d) if !d.is_nan() => d,
        _ => f32::INFINITY,
    }
}

/// Filter matching exactly one path
fn id_predicate(path: &str) -> String {
    format!("{} = '{}'", ID_COLUMN, path.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a StringArray>, StorageError> {
    batch
        .column_by_name(name)
        .map(|column| {
            column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| StorageError::Schema(format!("Invalid {} column type", name)))
        })
        .transpose()
}

fn optional_string(column: Option<&StringArray>, row: usize) -> Option<String> {
    column
        .filter(|c| !c.is_null(row))
        .map(|c| c.value(row).to_string())
}

/// Decode whichever known columns are present in `batch`
fn parse_batch(batch: &RecordBatch) -> Result<Vec<StoredRow>, StorageError> {
    let ids = string_column(batch, ID_COLUMN)?;
    let summaries = string_column(batch, SUMMARY_COLUMN)?;
    let filenames = string_column(batch, FILENAME_COLUMN)?;
    let previews = string_column(batch, PREVIEW_COLUMN)?;
    let upload_times = string_column(batch, UPLOAD_TIME_COLUMN)?;
    let extras = string_column(batch, EXTRA_COLUMN)?;

    let seqs = batch
        .column_by_name(SEQ_COLUMN)
        .map(|column| {
            column
                .as_any()
                .downcast_ref::<UInt64Array>()
                .ok_or_else(|| StorageError::Schema("Invalid seq column type".to_string()))
        })
        .transpose()?;

    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .map(|column| {
            column
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .ok_or_else(|| StorageError::Schema("Invalid vector column type".to_string()))
        })
        .transpose()?;

    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|column| column.as_any().downcast_ref::<Float32Array>());

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let path = optional_string(ids, row).unwrap_or_default();

        let extra = match optional_string(extras, row) {
            Some(json) => parse_extra(&json, &path),
            None => Map::new(),
        };

        let vector = match vectors {
            Some(list) => Some(vector_at(list, row)?),
            None => None,
        };

        let metadata = VideoMetadata {
            upload_time: optional_string(upload_times, row).unwrap_or_default(),
            filename: optional_string(filenames, row).unwrap_or_default(),
            summary_preview: optional_string(previews, row).unwrap_or_default(),
            path: path.clone(),
            extra,
        };

        rows.push(StoredRow {
            seq: seqs.map_or(0, |s| s.value(row)),
            summary: optional_string(summaries, row),
            vector,
            distance: distances.filter(|d| !d.is_null(row)).map(|d| d.value(row)),
            path,
            metadata,
        });
    }

    Ok(rows)
}

fn vector_at(list: &FixedSizeListArray, row: usize) -> Result<Vec<f32>, StorageError> {
    let values = list.value(row);
    let floats = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| StorageError::Schema("Vector values are not float32".to_string()))?;
    Ok(floats.values().to_vec())
}

fn parse_extra(json: &str, path: &str) -> Map<String, Value> {
    match serde_json::from_str::<Map<String, Value>>(json) {
        Ok(extra) => extra,
        Err(e) => {
            warn!("Ignoring malformed metadata for {}: {}", path, e);
            Map::new()
        }
    }
}

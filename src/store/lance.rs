//! Content-addressed LanceDB-backed vector store (spec §4.6, §6.1).
//!
//! One table (`"chunks"`) per collection at `<project_dir>/lf_data/stores/<database_name>`.
//! Metadata is stored as a JSON blob column and matched client-side — LanceDB
//! has no JSON predicate pushdown, so `MetadataFilter` equality is applied
//! after fetching candidate rows rather than compiled into the SQL `only_if`.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::store::VectorStore;
use crate::types::{Chunk, Metadata, MetadataFilter};

const TABLE_NAME: &str = "chunks";

pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
}

impl LanceStore {
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| RagError::StoreError(format!("creating store dir: {e}")))?;
        let db = lancedb::connect(&path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| RagError::StoreError(format!("connecting to LanceDB at {}: {e}", path.display())))?;
        let store = Self { db, dimension };
        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), self.dimension as i32),
                true,
            ),
            Field::new("metadata_json", DataType::Utf8, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await.map_err(store_err)?;
        if names.contains(&TABLE_NAME.to_string()) {
            return Ok(());
        }

        let schema = self.schema();
        let seed = self.seed_batch()?;
        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db.create_table(TABLE_NAME, Box::new(batches)).execute().await.map_err(store_err)?;

        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        table.delete("id = '__seed__'").await.map_err(store_err)?;
        Ok(())
    }

    /// LanceDB requires a non-empty batch to infer schema from on table
    /// creation; this placeholder row is deleted immediately afterward.
    fn seed_batch(&self) -> Result<RecordBatch> {
        let schema = self.schema();
        let values = Float32Array::from(vec![0.0f32; self.dimension]);
        let embedding_field = Field::new("item", DataType::Float32, true);
        let embedding_array =
            FixedSizeListArray::new(Arc::new(embedding_field), self.dimension as i32, Arc::new(values) as Arc<dyn Array>, None);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec![""])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(embedding_array) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec!["{}"])),
            ],
        )
        .map_err(|e| RagError::StoreError(format!("building seed record batch: {e}")))
    }

    fn batch_from_chunks(&self, chunks: &[Chunk]) -> Result<RecordBatch> {
        let schema = self.schema();
        let ids: Vec<String> = chunks.iter().map(|c| c.id.to_string()).collect();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        let metadata_jsons: Vec<String> =
            chunks.iter().map(|c| serde_json::to_string(&c.metadata).unwrap_or_else(|_| "{}".into())).collect();

        let flat_embeddings: Vec<f32> = chunks
            .iter()
            .flat_map(|c| c.embedding.clone().unwrap_or_else(|| vec![0.0; self.dimension]))
            .collect();
        let values = Float32Array::from(flat_embeddings);
        let embedding_field = Field::new("item", DataType::Float32, true);
        let embedding_array =
            FixedSizeListArray::new(Arc::new(embedding_field), self.dimension as i32, Arc::new(values) as Arc<dyn Array>, None);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(sources)),
                Arc::new(embedding_array) as Arc<dyn Array>,
                Arc::new(StringArray::from(metadata_jsons)),
            ],
        )
        .map_err(|e| RagError::StoreError(format!("building record batch: {e}")))
    }

    async fn existing_ids(&self, table: &lancedb::Table) -> Result<std::collections::HashSet<Uuid>> {
        let results = table.query().select(lancedb::query::Select::columns(&["id"])).execute().await.map_err(store_err)?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await.map_err(store_err)?;

        let mut ids = std::collections::HashSet::new();
        for batch in &batches {
            let Some(col) = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()) else { continue };
            for i in 0..batch.num_rows() {
                if let Ok(id) = Uuid::parse_str(col.value(i)) {
                    ids.insert(id);
                }
            }
        }
        Ok(ids)
    }

    fn rows_to_chunks(batches: &[RecordBatch]) -> Vec<(Chunk, f32)> {
        let mut out = Vec::new();
        for batch in batches {
            let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let contents = batch.column_by_name("content").and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let sources = batch.column_by_name("source").and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let metadata_jsons = batch.column_by_name("metadata_json").and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let (Some(ids), Some(contents), Some(sources)) = (ids, contents, sources) else { continue };

            for i in 0..batch.num_rows() {
                let id_str = ids.value(i);
                if id_str == "__seed__" {
                    continue;
                }
                let Ok(id) = Uuid::parse_str(id_str) else { continue };
                let metadata: Metadata = metadata_jsons
                    .map(|m| serde_json::from_str(m.value(i)).unwrap_or_default())
                    .unwrap_or_default();
                let score = distances.map(|d| (1.0 - d.value(i)).max(0.0)).unwrap_or(0.0);

                out.push((
                    Chunk { id, content: contents.value(i).to_string(), source: sources.value(i).to_string(), embedding: None, metadata },
                    score,
                ));
            }
        }
        out
    }
}

fn store_err(e: impl std::fmt::Display) -> RagError {
    RagError::StoreError(e.to_string())
}

#[async_trait]
impl VectorStore for LanceStore {
    /// Insert chunks not already present by id. Re-adding chunks whose ids
    /// already have rows is a no-op for those chunks (spec §8 invariant 1) —
    /// `stamp()` derives `id` from content, so identical input re-ingested
    /// produces identical ids and this is what makes `add_documents` idempotent.
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<Vec<Uuid>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        let existing = self.existing_ids(&table).await?;
        let new_chunks: Vec<Chunk> = chunks.into_iter().filter(|c| !existing.contains(&c.id)).collect();
        if new_chunks.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = new_chunks.iter().map(|c| c.id).collect();
        let schema = self.schema();
        let batch = self.batch_from_chunks(&new_chunks)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await.map_err(store_err)?;
        Ok(ids)
    }

    async fn search(&self, query_embedding: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<(Chunk, f32)>> {
        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        // Overfetch when a client-side filter will be applied afterward, since
        // LanceDB can't push an arbitrary-key JSON equality predicate into the ANN scan.
        let fetch_k = if filter.is_some() { k.saturating_mul(5).max(k + 20) } else { k };

        let query = table
            .query()
            .nearest_to(query_embedding)
            .map_err(store_err)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(fetch_k);

        let results = query.execute().await.map_err(store_err)?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await.map_err(store_err)?;
        let mut scored = Self::rows_to_chunks(&batches);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut scored: Vec<(Chunk, f32)> =
            scored.into_iter().filter(|(chunk, _)| filter.map(|f| f.matches(chunk)).unwrap_or(true)).collect();
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_documents_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>> {
        if filter.is_empty() {
            return Err(RagError::InvalidArgument("metadata filter must not be empty".into()));
        }
        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        let results = table.query().execute().await.map_err(store_err)?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await.map_err(store_err)?;
        let matched = Self::rows_to_chunks(&batches)
            .into_iter()
            .filter(|(chunk, _)| filter.matches(chunk))
            .map(|(chunk, _)| chunk)
            .collect();
        Ok(matched)
    }

    async fn delete_documents(&self, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        let count_before = table.count_rows(None).await.unwrap_or(0);

        let id_list: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
        let predicate = format!("id IN ({})", id_list.join(", "));
        table.delete(&predicate).await.map_err(store_err)?;

        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before.saturating_sub(count_after))
    }

    async fn delete_collection(&self) -> Result<()> {
        let names = self.db.table_names().execute().await.map_err(store_err)?;
        if names.contains(&TABLE_NAME.to_string()) {
            self.db.drop_table(TABLE_NAME, &[]).await.map_err(store_err)?;
        }
        self.ensure_table().await
    }

    async fn list_documents(&self, limit: usize, offset: usize, include_content: bool) -> Result<(Vec<Chunk>, usize)> {
        let table = self.db.open_table(TABLE_NAME).execute().await.map_err(store_err)?;
        let total_count = table.count_rows(None).await.map_err(store_err)?.saturating_sub(1); // exclude the seed row if it somehow lingers

        // LanceDB's query builder has no offset primitive, so fetch through the
        // end of the requested page and skip the leading rows client-side.
        let fetch_through = offset.saturating_add(limit);
        let results = table.query().limit(fetch_through).execute().await.map_err(store_err)?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await.map_err(store_err)?;

        let mut chunks: Vec<Chunk> = Self::rows_to_chunks(&batches)
            .into_iter()
            .map(|(mut chunk, _)| {
                if !include_content {
                    chunk.content.clear();
                }
                chunk
            })
            .collect();

        let page: Vec<Chunk> = chunks.drain(..).skip(offset).take(limit).collect();
        Ok((page, total_count))
    }
}

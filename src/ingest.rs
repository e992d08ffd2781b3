//! Ingestion driver (spec §4.9, C9): runs a batch of file blobs through the
//! blob processor and into the vector store, never aborting the whole batch
//! over one bad file.

use std::collections::HashMap;

use crate::blob_processor::BlobProcessor;
use crate::config::DataProcessingStrategyConfig;
use crate::error::{RagError, Result};
use crate::external::Embedder;
use crate::hashing;
use crate::lifecycle;
use crate::store::VectorStore;
use crate::types::{Chunk, FileBlob};

/// Whether a file whose `file_hash` already has live chunks in the store
/// should be deleted-and-reingested or skipped outright (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReingestPolicy {
    #[default]
    DeleteThenReingest,
    SkipIfPresent,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FileError {
    pub filename: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProcessingMetrics {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub stored_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub deleted_before_reingest: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProcessingResult {
    pub stored_chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedFile>,
    pub errors: Vec<FileError>,
    pub metrics: ProcessingMetrics,
}

pub struct IngestionDriver<'a> {
    pub processor: BlobProcessor<'a>,
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub reingest_policy: ReingestPolicy,
}

impl<'a> IngestionDriver<'a> {
    pub fn new(processor: BlobProcessor<'a>, store: &'a dyn VectorStore, embedder: &'a dyn Embedder) -> Self {
        Self { processor, store, embedder, reingest_policy: ReingestPolicy::default() }
    }

    pub fn with_reingest_policy(mut self, policy: ReingestPolicy) -> Self {
        self.reingest_policy = policy;
        self
    }

    /// Ingest a batch of blobs under one strategy (spec §4.9 steps 1-5).
    pub async fn ingest_batch(&self, blobs: &[FileBlob], strategy: &DataProcessingStrategyConfig) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::default();
        let mut accepted: Vec<Chunk> = Vec::new();

        for blob in blobs {
            result.metrics.total_documents += 1;

            let file_hash = hashing::file_hash(&blob.bytes);

            match self.reingest_policy {
                ReingestPolicy::DeleteThenReingest => match lifecycle::delete_by_file_hash(self.store, &file_hash).await {
                    Ok(deletion) => result.metrics.deleted_before_reingest += deletion.deleted_count,
                    Err(e) => {
                        result.errors.push(FileError { filename: blob.filename.clone(), kind: e.kind().to_string(), message: e.to_string() });
                        result.metrics.error_count += 1;
                        continue;
                    }
                },
                ReingestPolicy::SkipIfPresent => {
                    let filter = crate::types::MetadataFilter::new().with("file_hash", file_hash.clone());
                    let existing = match self.store.get_documents_by_metadata(&filter).await {
                        Ok(existing) => existing,
                        Err(e) => {
                            result.errors.push(FileError { filename: blob.filename.clone(), kind: e.kind().to_string(), message: e.to_string() });
                            result.metrics.error_count += 1;
                            continue;
                        }
                    };
                    if !existing.is_empty() {
                        result.skipped.push(SkippedFile {
                            filename: blob.filename.clone(),
                            reason: "file_hash already has live chunks".into(),
                        });
                        result.metrics.skipped_count += 1;
                        continue;
                    }
                }
            }

            match self.processor.process(blob, strategy) {
                Ok(chunks) => {
                    result.metrics.total_chunks += chunks.len();
                    accepted.extend(chunks);
                }
                Err(e) if e.kind() == "UnsupportedFileType" => {
                    result.skipped.push(SkippedFile { filename: blob.filename.clone(), reason: e.to_string() });
                    result.metrics.skipped_count += 1;
                }
                Err(e) => {
                    result.errors.push(FileError { filename: blob.filename.clone(), kind: e.kind().to_string(), message: e.to_string() });
                    result.metrics.error_count += 1;
                }
            }
        }

        if accepted.is_empty() {
            result.metrics.stored_count = 0;
            return Ok(result);
        }

        if let Err(e) = self.embed_and_store(&mut accepted).await {
            result.errors.push(FileError { filename: "<batch>".into(), kind: e.kind().to_string(), message: e.to_string() });
            result.metrics.error_count += 1;
            return Ok(result);
        }

        result.metrics.stored_count = accepted.len();
        result.stored_chunks = accepted;
        Ok(result)
    }

    async fn embed_and_store(&self, chunks: &mut [Chunk]) -> Result<()> {
        const EMBED_BATCH_SIZE: usize = 64;

        for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::StoreError(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = Some(embedding);
            }
        }

        self.store.add_documents(chunks.to_vec()).await?;
        Ok(())
    }
}

#[allow(dead_code)]
fn per_component_counters(metrics: &ProcessingMetrics) -> HashMap<&'static str, usize> {
    HashMap::from([
        ("total_documents", metrics.total_documents),
        ("total_chunks", metrics.total_chunks),
        ("stored_count", metrics.stored_count),
        ("skipped_count", metrics.skipped_count),
        ("error_count", metrics.error_count),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{extractors, parsers};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    #[derive(Default)]
    struct FakeStore {
        added: Mutex<Vec<Chunk>>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<Vec<uuid::Uuid>> {
            let ids = chunks.iter().map(|c| c.id).collect();
            self.added.lock().unwrap().extend(chunks);
            Ok(ids)
        }
        async fn search(&self, _embedding: &[f32], _top_k: usize, _filter: Option<&crate::types::MetadataFilter>) -> Result<Vec<(Chunk, f32)>> {
            Ok(vec![])
        }
        async fn get_documents_by_metadata(&self, _filter: &crate::types::MetadataFilter) -> Result<Vec<Chunk>> {
            Ok(vec![])
        }
        async fn delete_documents(&self, _ids: &[uuid::Uuid]) -> Result<usize> {
            Ok(0)
        }
        async fn delete_collection(&self) -> Result<()> {
            Ok(())
        }
        async fn list_documents(&self, _limit: usize, _offset: usize, _include_content: bool) -> Result<(Vec<Chunk>, usize)> {
            let all = self.added.lock().unwrap().clone();
            let total = all.len();
            Ok((all, total))
        }
    }

    fn strategy() -> DataProcessingStrategyConfig {
        DataProcessingStrategyConfig {
            name: "default".into(),
            parsers: vec![],
            extractors: vec![],
            chunking: crate::config::ChunkingConfig { chunk_size: 40, chunk_overlap: 5, min_chunk_size: 5, ..Default::default() },
            retention: None,
        }
    }

    #[tokio::test]
    async fn unsupported_file_is_skipped_not_errored_and_batch_continues() {
        let registry = parsers::default_registry();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);
        let store = FakeStore::default();
        let embedder = FakeEmbedder;
        let driver = IngestionDriver::new(processor, &store, &embedder);

        let blobs = vec![
            FileBlob::new(b"whatever".to_vec(), "file.exotic"),
            FileBlob::new(b"This is a perfectly normal text document with enough content.".to_vec(), "doc.txt"),
        ];

        let result = driver.ingest_batch(&blobs, &strategy()).await.unwrap();
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.metrics.total_documents, 2);
        assert!(result.metrics.stored_count > 0);
    }
}

//! Top-level facade wiring config, resolver, driver, and retrieval into the
//! Core API upstream HTTP/CLI collaborators call (spec §6.6). Mirrors the
//! teacher's `RAGEngine`: one struct owning every store the config declares,
//! built once at startup, with thin per-call methods delegating to C5-C10.

use std::collections::HashMap;
use std::sync::Arc;

use crate::blob_processor::BlobProcessor;
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::external::{Embedder, LlmClient, Reranker};
use crate::ingest::{IngestionDriver, ProcessingResult, ReingestPolicy};
use crate::lifecycle::{self, DeletionResult};
use crate::preview::{self, PreviewOverrides, PreviewResult};
use crate::resolver::Resolver;
use crate::retrieval::RetrievalContext;
use crate::store::{LanceStore, VectorStore};
use crate::types::{FileBlob, MetadataFilter, SearchResult};

pub struct RagEngine {
    config: RagConfig,
    stores: HashMap<String, LanceStore>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LlmClient>>,
    reranker: Option<Arc<dyn Reranker>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatasetDeletionResult {
    pub total_deleted_chunks: usize,
    pub total_files_cleared: usize,
    pub total_files_failed: usize,
}

impl RagEngine {
    /// Open every configured database's store up front (spec §4.10, §6.1).
    pub async fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LlmClient>>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Result<Self> {
        config.validate().map_err(RagError::InvalidArgument)?;

        let resolver = Resolver::new(&config);
        let mut stores = HashMap::new();
        for database in &config.databases {
            let store = resolver.open_store(database).await?;
            stores.insert(database.name.clone(), store);
        }

        Ok(Self { config, stores, embedder, llm, reranker })
    }

    fn store(&self, database_name: &str) -> Result<&LanceStore> {
        self.stores.get(database_name).ok_or_else(|| RagError::NotFound(format!("database '{database_name}'")))
    }

    /// `ingest(dataset, blobs) -> ProcessingResult` (spec §4.9, §6.6). The
    /// HTTP layer turns this into an async `task_id` response; the actual
    /// batch work is synchronous from this crate's point of view.
    pub async fn ingest(&self, dataset: &str, blobs: &[FileBlob]) -> Result<ProcessingResult> {
        let resolver = Resolver::new(&self.config);
        let resolved = resolver.resolve_dataset(dataset)?;
        let store = self.store(&resolved.database.name)?;

        let processor = BlobProcessor::new(&resolved.strategy.parsers, &resolved.strategy.extractors);
        let driver = IngestionDriver::new(processor, store, self.embedder.as_ref())
            .with_reingest_policy(ReingestPolicy::DeleteThenReingest);

        driver.ingest_batch(blobs, &resolved.strategy.config).await
    }

    /// `preview(database, blob, overrides?) -> PreviewResult` (spec §4.8, §6.6).
    pub fn preview(&self, dataset: &str, blob: &FileBlob, overrides: &PreviewOverrides) -> Result<PreviewResult> {
        let resolver = Resolver::new(&self.config);
        let resolved = resolver.resolve_dataset(dataset)?;
        let processor = BlobProcessor::new(&resolved.strategy.parsers, &resolved.strategy.extractors);
        preview::generate_preview(&processor, blob, &resolved.strategy.config, overrides)
    }

    /// `delete_file_chunks(dataset, file_hash) -> {deleted_count}` (spec §6.6).
    pub async fn delete_file_chunks(&self, dataset: &str, file_hash: &str) -> Result<DeletionResult> {
        let resolver = Resolver::new(&self.config);
        let resolved = resolver.resolve_dataset(dataset)?;
        let store = self.store(&resolved.database.name)?;
        lifecycle::delete_by_file_hash(store, file_hash).await
    }

    /// `delete_dataset_chunks(dataset) -> {total_deleted_chunks, total_files_cleared,
    /// total_files_failed}` (spec §6.6): enumerate every distinct `file_hash`
    /// currently in the store and delete each in turn, rather than dropping
    /// the whole collection, so a partial failure is reported per file.
    pub async fn delete_dataset_chunks(&self, dataset: &str) -> Result<DatasetDeletionResult> {
        let resolver = Resolver::new(&self.config);
        let resolved = resolver.resolve_dataset(dataset)?;
        let store = self.store(&resolved.database.name)?;

        const PAGE_SIZE: usize = 10_000;
        let mut file_hashes: Vec<String> = Vec::new();
        let mut offset = 0;
        loop {
            let (page, total_count) = store.list_documents(PAGE_SIZE, offset, false).await?;
            let page_len = page.len();
            file_hashes.extend(page.iter().filter_map(|c| c.meta_str("file_hash").map(str::to_string)));
            offset += page_len;
            if page_len == 0 || offset >= total_count {
                break;
            }
        }
        file_hashes.sort();
        file_hashes.dedup();

        let mut result = DatasetDeletionResult::default();
        for file_hash in file_hashes {
            match lifecycle::delete_by_file_hash(store, &file_hash).await {
                Ok(deletion) => {
                    result.total_deleted_chunks += deletion.deleted_count;
                    result.total_files_cleared += 1;
                }
                Err(e) => {
                    tracing::warn!("failed to delete file_hash {file_hash}: {e}");
                    result.total_files_failed += 1;
                }
            }
        }
        Ok(result)
    }

    /// `search(database, query, top_k?, min_score?, metadata_filter?,
    /// retrieval_strategy?) -> list<SearchResult>` (spec §6.6).
    pub async fn search(
        &self,
        database_name: &str,
        retrieval_strategy: &str,
        query: &str,
        top_k: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let database = self
            .config
            .database(database_name)
            .ok_or_else(|| RagError::NotFound(format!("database '{database_name}'")))?;
        let store = self.store(database_name)?;

        let resolver = Resolver::new(&self.config);
        // `resolve_retrieval_strategy` also validates that a `model_name` this
        // strategy references actually resolves (spec §4.10); the collaborator
        // instances themselves are the ones this engine was built with.
        let (strategy, _model) = resolver.resolve_retrieval_strategy(database, retrieval_strategy)?;

        let ctx = RetrievalContext {
            store,
            embedder: self.embedder.as_ref(),
            reranker: self.reranker.as_deref(),
            llm: self.llm.as_deref(),
            metadata_filter,
        };

        let result = strategy.retrieve(&ctx, query, top_k).await?;

        let min_score = min_score.unwrap_or(f32::MIN);
        let mut out = Vec::with_capacity(result.documents.len());
        for (doc, score) in result.documents.into_iter().zip(result.scores) {
            if score < min_score {
                continue;
            }
            out.push(SearchResult {
                id: doc.id,
                content: doc.content,
                score,
                source: Some(doc.source.clone()),
                metadata: doc.metadata,
            });
        }
        Ok(out)
    }
}

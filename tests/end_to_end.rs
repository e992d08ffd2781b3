//! End-to-end scenarios from spec §8, exercised against an in-memory fake
//! store/embedder/LLM rather than LanceDB or a real HTTP collaborator —
//! hermetic, no network, mirroring the teacher's own preference for fakes
//! over mocks in integration tests.

use std::sync::Mutex;

use async_trait::async_trait;
use rag_data_plane::external::{ChatMessage, ChatParams, Embedder, LlmClient};
use rag_data_plane::ingest::{IngestionDriver, ReingestPolicy};
use rag_data_plane::lifecycle;
use rag_data_plane::processing::extractors;
use rag_data_plane::processing::parsers;
use rag_data_plane::retrieval::{BasicSimilarity, MultiTurnRag, RetrievalContext, RetrievalStrategy};
use rag_data_plane::store::VectorStore;
use rag_data_plane::types::{Chunk, FileBlob, MetadataFilter};
use uuid::Uuid;

#[derive(Default)]
struct FakeStore {
    rows: Mutex<Vec<Chunk>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn add_documents(&self, chunks: Vec<Chunk>) -> rag_data_plane::Result<Vec<Uuid>> {
        let mut rows = self.rows.lock().unwrap();
        let existing: std::collections::HashSet<Uuid> = rows.iter().map(|c| c.id).collect();
        let mut inserted = Vec::new();
        for chunk in chunks {
            if existing.contains(&chunk.id) {
                continue;
            }
            inserted.push(chunk.id);
            rows.push(chunk);
        }
        Ok(inserted)
    }

    async fn search(&self, query_embedding: &[f32], k: usize, filter: Option<&MetadataFilter>) -> rag_data_plane::Result<Vec<(Chunk, f32)>> {
        let rows = self.rows.lock().unwrap();
        let mut scored: Vec<(Chunk, f32)> = rows
            .iter()
            .filter(|c| filter.map(|f| f.matches(c)).unwrap_or(true))
            .map(|c| {
                let score = c.embedding.as_deref().map(|e| cosine(e, query_embedding)).unwrap_or(0.0);
                (c.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_documents_by_metadata(&self, filter: &MetadataFilter) -> rag_data_plane::Result<Vec<Chunk>> {
        Ok(self.rows.lock().unwrap().iter().filter(|c| filter.matches(c)).cloned().collect())
    }

    async fn delete_documents(&self, ids: &[Uuid]) -> rag_data_plane::Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|c| !ids.contains(&c.id));
        Ok(before - rows.len())
    }

    async fn delete_collection(&self) -> rag_data_plane::Result<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn list_documents(&self, limit: usize, offset: usize, include_content: bool) -> rag_data_plane::Result<(Vec<Chunk>, usize)> {
        let rows = self.rows.lock().unwrap();
        let total = rows.len();
        let page = rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .map(|mut c| {
                if !include_content {
                    c.content.clear();
                }
                c
            })
            .collect();
        Ok((page, total))
    }
}

struct ConstantEmbedder {
    vector: Vec<f32>,
}

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed(&self, texts: &[String]) -> rag_data_plane::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
    fn dimension(&self) -> usize {
        self.vector.len()
    }
}

fn dim384_onehot() -> Vec<f32> {
    let mut v = vec![0.0; 384];
    v[0] = 1.0;
    v
}

fn default_strategy(chunk_size: usize, chunk_overlap: usize) -> rag_data_plane::config::DataProcessingStrategyConfig {
    rag_data_plane::config::DataProcessingStrategyConfig {
        name: "default".into(),
        parsers: vec![],
        extractors: vec![],
        chunking: rag_data_plane::config::ChunkingConfig {
            strategy: rag_data_plane::config::ChunkStrategyName::Characters,
            chunk_size,
            chunk_overlap,
            min_chunk_size: 10,
            max_chunk_size: chunk_size * 4,
        },
        retention: None,
    }
}

/// Scenario A — ingest, retrieve, delete.
#[tokio::test]
async fn scenario_a_ingest_retrieve_delete() {
    let store = FakeStore::default();
    let embedder = ConstantEmbedder { vector: dim384_onehot() };

    let registry = parsers::default_registry();
    let chain = extractors::default_chain();
    let processor = rag_data_plane::blob_processor::BlobProcessor::new(&registry, &chain);
    let driver = IngestionDriver::new(processor, &store, &embedder).with_reingest_policy(ReingestPolicy::DeleteThenReingest);

    let content = "The quick brown fox jumps over the lazy dog. ".repeat(20);
    let bytes = content.as_bytes().to_vec();
    let blob = FileBlob::new(bytes.clone(), "doc.txt");

    let result = driver.ingest_batch(&[blob], &default_strategy(200, 20)).await.unwrap();
    assert!(result.metrics.total_chunks >= 4);

    let ctx = RetrievalContext { store: &store, embedder: &embedder, reranker: None, llm: None, metadata_filter: None };
    let retrieval = BasicSimilarity.retrieve(&ctx, "anything", 3).await.unwrap();
    assert_eq!(retrieval.documents.len(), 3);
    assert!(retrieval.scores.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-6));

    let file_hash = rag_data_plane::hashing::file_hash(&bytes);
    let deletion = lifecycle::delete_by_file_hash(&store, &file_hash).await.unwrap();
    assert!(deletion.deleted_count >= 4);

    let (remaining, total) = store.list_documents(100, 0, true).await.unwrap();
    assert_eq!(remaining.len(), 0);
    assert_eq!(total, 0);
}

/// Scenario D — MultiTurnRAG decomposition dispatches every sub-query and
/// merges non-overlapping results sorted by descending score.
#[tokio::test]
async fn scenario_d_multi_turn_decomposition() {
    struct FakeLlm;
    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn chat(&self, _messages: &[ChatMessage], _params: &ChatParams) -> rag_data_plane::Result<String> {
            Ok("<question>What is llama fiber?</question><question>What is alpaca fiber?</question><question>How do they compare?</question>".to_string())
        }
    }

    struct DistinctEmbedder;
    #[async_trait]
    impl Embedder for DistinctEmbedder {
        async fn embed(&self, texts: &[String]) -> rag_data_plane::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 3];
                    v[t.len() % 3] = 1.0;
                    v
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    let store = FakeStore::default();
    let embedder = DistinctEmbedder;
    let llm = FakeLlm;

    for q in 0..3 {
        for i in 0..10 {
            let mut chunk = Chunk::new(format!("sub-query {q} result {i}"), "doc.txt");
            chunk.embedding = Some(vec![1.0, 0.0, 0.0]);
            store.add_documents(vec![chunk]).await.unwrap();
        }
    }

    let strategy = MultiTurnRag::default();
    let ctx = RetrievalContext { store: &store, embedder: &embedder, reranker: None, llm: Some(&llm), metadata_filter: None };

    let query = "What are llama and alpaca fibers, and how do they compare in warmth and price?";
    assert!(query.len() >= 50);

    let result = strategy.retrieve(&ctx, query, 10).await.unwrap();

    assert_eq!(result.strategy_metadata.get("decomposed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(result.strategy_metadata.get("sub_queries_count").and_then(|v| v.as_u64()), Some(3));
    assert!(result.scores.windows(2).all(|w| w[0] >= w[1]));

    let mut seen = std::collections::HashSet::new();
    for doc in &result.documents {
        assert!(seen.insert(doc.id), "duplicate id in MultiTurnRAG result");
    }
}

/// Scenario F — deletion by file hash is atomic and leaves the other file's
/// chunks untouched.
#[tokio::test]
async fn scenario_f_deletion_by_file_hash_is_atomic() {
    let store = FakeStore::default();
    let embedder = ConstantEmbedder { vector: vec![1.0, 0.0, 0.0] };

    let registry = parsers::default_registry();
    let chain = extractors::default_chain();
    let processor = rag_data_plane::blob_processor::BlobProcessor::new(&registry, &chain);
    let driver = IngestionDriver::new(processor, &store, &embedder).with_reingest_policy(ReingestPolicy::DeleteThenReingest);

    let bytes_a = "Document A content that is long enough to produce several chunks across the sliding window.".repeat(3).into_bytes();
    let bytes_b = "Document B shorter content, still enough for a couple of chunks to form from it.".repeat(2).into_bytes();

    let blob_a = FileBlob::new(bytes_a.clone(), "a.txt");
    let blob_b = FileBlob::new(bytes_b.clone(), "b.txt");

    driver.ingest_batch(&[blob_a], &default_strategy(60, 5)).await.unwrap();
    driver.ingest_batch(&[blob_b], &default_strategy(60, 5)).await.unwrap();

    let hash_a = rag_data_plane::hashing::file_hash(&bytes_a);
    let deletion = lifecycle::delete_by_file_hash(&store, &hash_a).await.unwrap();
    assert!(deletion.deleted_count >= 2);

    let (remaining, total) = store.list_documents(1000, 0, true).await.unwrap();
    assert!(remaining.iter().all(|c| c.meta_str("filename") == Some("b.txt")));
    assert_eq!(total, remaining.len());
}

/// Scenario C — parser priority: the lower-priority-number parser runs
/// first; a failing higher-priority match still lets a later match succeed.
#[test]
fn scenario_c_parser_priority_is_respected() {
    use rag_data_plane::error::{RagError, Result};
    use rag_data_plane::processing::parser::{Parser, ParserRegistry};
    use rag_data_plane::types::{Metadata, ParsedDocument, ParsedFragment};

    struct HighPriority;
    impl Parser for HighPriority {
        fn name(&self) -> &'static str {
            "HighPriority"
        }
        fn parse(&self, _blob: &FileBlob) -> Result<ParsedDocument> {
            Err(RagError::StoreError("boom".into()))
        }
    }
    struct LowPriority;
    impl Parser for LowPriority {
        fn name(&self) -> &'static str {
            "LowPriority"
        }
        fn parse(&self, _blob: &FileBlob) -> Result<ParsedDocument> {
            Ok(ParsedDocument {
                fragments: vec![ParsedFragment { section_label: None, text: "OK".into(), local_metadata: Metadata::new() }],
                structured_sections: vec![],
                doc_metadata: Metadata::new(),
            })
        }
    }

    let registry = ParserRegistry::new().register(Box::new(HighPriority), &["*.pdf"], 1).register(Box::new(LowPriority), &["*.pdf"], 10);
    let blob = FileBlob::new(b"whatever".to_vec(), "doc.pdf");
    let (doc, name) = registry.parse_with_name(&blob).unwrap();
    assert_eq!(name, "LowPriority");
    assert_eq!(doc.fragments[0].text, "OK");
}

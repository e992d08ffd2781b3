//! Retrieval strategy family (spec §4.7, C7): a closed sum type, not an
//! inheritance hierarchy — each variant is one concrete algorithm over the
//! same `VectorStore` + `Embedder` collaborators.

pub mod basic;
pub mod cross_encoder;
pub mod metadata_filtered;
pub mod multi_turn;

use async_trait::async_trait;

use crate::error::Result;
use crate::external::{Embedder, LlmClient, Reranker};
use crate::store::VectorStore;
use crate::types::{MetadataFilter, RetrievalResult};

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    async fn retrieve(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult>;
}

/// Collaborators and parameters shared by every strategy call (spec §4.7).
pub struct RetrievalContext<'a> {
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub reranker: Option<&'a dyn Reranker>,
    pub llm: Option<&'a dyn LlmClient>,
    pub metadata_filter: Option<&'a MetadataFilter>,
}

pub use basic::BasicSimilarity;
pub use cross_encoder::CrossEncoderReranked;
pub use metadata_filtered::MetadataFiltered;
pub use multi_turn::MultiTurnRag;

//! `MetadataFiltered`: same as `BasicSimilarity` but the caller-supplied
//! metadata filter is mandatory — searching with no filter at all defeats
//! the point of this strategy, so it's rejected up front (spec §4.7.2).

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::retrieval::basic::unzip_scored;
use crate::retrieval::{RetrievalContext, RetrievalStrategy};
use crate::types::RetrievalResult;

pub struct MetadataFiltered;

#[async_trait]
impl RetrievalStrategy for MetadataFiltered {
    async fn retrieve(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let filter = ctx
            .metadata_filter
            .filter(|f| !f.is_empty())
            .ok_or_else(|| RagError::InvalidArgument("MetadataFiltered requires a non-empty metadata filter".into()))?;

        let embedding = ctx.embedder.embed_one(query).await?;
        let scored = ctx.store.search(&embedding, top_k, Some(filter)).await?;
        let (documents, scores) = unzip_scored(scored);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("strategy".to_string(), serde_json::json!("MetadataFiltered"));

        Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
    }
}

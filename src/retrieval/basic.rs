//! `BasicSimilarity`: embed the query, nearest-neighbor search, done
//! (spec §4.7.1).

use async_trait::async_trait;

use crate::error::Result;
use crate::retrieval::{RetrievalContext, RetrievalStrategy};
use crate::types::RetrievalResult;

pub struct BasicSimilarity;

#[async_trait]
impl RetrievalStrategy for BasicSimilarity {
    async fn retrieve(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let embedding = ctx.embedder.embed_one(query).await?;
        let scored = ctx.store.search(&embedding, top_k, ctx.metadata_filter).await?;
        let (documents, scores) = unzip_scored(scored);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("strategy".to_string(), serde_json::json!("BasicSimilarity"));

        Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
    }
}

/// Split a store's `(Chunk, score)` pairs into separate vectors — the
/// `RetrievalResult` shape every strategy in this module returns.
pub(crate) fn unzip_scored(scored: Vec<(crate::types::Chunk, f32)>) -> (Vec<crate::types::Chunk>, Vec<f32>) {
    scored.into_iter().unzip()
}

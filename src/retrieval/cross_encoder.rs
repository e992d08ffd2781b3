//! `CrossEncoderReranked`: overfetch a wider candidate set, score it with an
//! external cross-encoder, truncate to `top_k`. If reranking fails or times
//! out, degrade to the unreranked similarity order rather than failing the
//! whole request — reranking is a quality optimization, not a requirement
//! (spec §4.7.3).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::retrieval::{RetrievalContext, RetrievalStrategy};
use crate::types::{Chunk, RetrievalResult};

const RERANK_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_OVERFETCH_FACTOR: usize = 3;

pub struct CrossEncoderReranked {
    pub overfetch_factor: usize,
}

impl Default for CrossEncoderReranked {
    fn default() -> Self {
        Self { overfetch_factor: DEFAULT_OVERFETCH_FACTOR }
    }
}

#[async_trait]
impl RetrievalStrategy for CrossEncoderReranked {
    async fn retrieve(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let embedding = ctx.embedder.embed_one(query).await?;
        let overfetch_k = (top_k * self.overfetch_factor).max(top_k + 10);
        let candidates = ctx.store.search(&embedding, overfetch_k, ctx.metadata_filter).await?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("strategy".to_string(), serde_json::json!("CrossEncoderReranked"));

        let Some(reranker) = ctx.reranker else {
            metadata.insert("reranked".to_string(), serde_json::json!(false));
            metadata.insert("fallback_reason".to_string(), serde_json::json!("no_reranker_configured"));
            let (documents, scores) = truncate_by_existing_score(candidates, top_k);
            return Ok(RetrievalResult { documents, scores, strategy_metadata: metadata });
        };

        let texts: Vec<String> = candidates.iter().map(|(c, _)| c.content.clone()).collect();
        let rerank_call = reranker.score(query, &texts);

        match tokio::time::timeout(RERANK_TIMEOUT, rerank_call).await {
            Ok(Ok(scores)) if scores.len() == candidates.len() => {
                metadata.insert("reranked".to_string(), serde_json::json!(true));
                let documents: Vec<Chunk> = candidates.into_iter().map(|(c, _)| c).collect();
                let (documents, scores) = sort_and_truncate(documents, scores, top_k);
                Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
            }
            Ok(Ok(_)) => {
                tracing::warn!("reranker returned a mismatched score count, keeping similarity order");
                metadata.insert("reranked".to_string(), serde_json::json!(false));
                metadata.insert("fallback_reason".to_string(), serde_json::json!("score_count_mismatch"));
                let (documents, scores) = truncate_by_existing_score(candidates, top_k);
                Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
            }
            Ok(Err(e)) => {
                tracing::warn!("reranking call failed: {e}, keeping similarity order");
                metadata.insert("reranked".to_string(), serde_json::json!(false));
                metadata.insert("fallback_reason".to_string(), serde_json::json!("reranker_error"));
                let (documents, scores) = truncate_by_existing_score(candidates, top_k);
                Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
            }
            Err(_) => {
                tracing::warn!("reranking timed out after {RERANK_TIMEOUT:?}, keeping similarity order");
                metadata.insert("reranked".to_string(), serde_json::json!(false));
                metadata.insert("fallback_reason".to_string(), serde_json::json!("timeout"));
                let (documents, scores) = truncate_by_existing_score(candidates, top_k);
                Ok(RetrievalResult { documents, scores, strategy_metadata: metadata })
            }
        }
    }
}

fn truncate_by_existing_score(mut scored: Vec<(Chunk, f32)>, top_k: usize) -> (Vec<Chunk>, Vec<f32>) {
    scored.truncate(top_k);
    scored.into_iter().unzip()
}

/// Sort by rerank score, truncate, and stamp each surviving chunk's own
/// metadata with `reranker_score`/`rerank_position` (spec §4.7.3) so callers
/// inspecting a chunk in isolation can see why it ranked where it did.
fn sort_and_truncate(documents: Vec<Chunk>, scores: Vec<f32>, top_k: usize) -> (Vec<Chunk>, Vec<f32>) {
    let mut paired: Vec<(Chunk, f32)> = documents.into_iter().zip(scores).collect();
    paired.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    paired.truncate(top_k);
    for (position, (chunk, score)) in paired.iter_mut().enumerate() {
        chunk.meta_set("reranker_score", *score as f64);
        chunk.meta_set("rerank_position", position as i64);
    }
    paired.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    #[test]
    fn sort_and_truncate_stamps_reranker_score_and_position() {
        let docs = vec![Chunk::new("a", "doc.txt"), Chunk::new("b", "doc.txt"), Chunk::new("c", "doc.txt")];
        let scores = vec![0.2, 0.9, 0.5];
        let (sorted, final_scores) = sort_and_truncate(docs, scores, 2);

        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].content, "b");
        assert_eq!(sorted[1].content, "c");
        assert_eq!(final_scores, vec![0.9, 0.5]);
        assert_eq!(sorted[0].metadata.get("rerank_position").and_then(|v| v.as_f64()), Some(0.0));
        assert_eq!(sorted[1].metadata.get("rerank_position").and_then(|v| v.as_f64()), Some(1.0));
        assert!(sorted[0].metadata.contains_key("reranker_score"));
    }

    #[test]
    fn truncate_by_existing_score_does_not_stamp_reranker_fields() {
        let scored = vec![(Chunk::new("a", "doc.txt"), 0.5)];
        let (docs, _) = truncate_by_existing_score(scored, 1);
        assert!(!docs[0].metadata.contains_key("reranker_score"));
    }
}

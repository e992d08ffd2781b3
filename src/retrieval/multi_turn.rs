//! `MultiTurnRAG`: complexity detection → LLM decomposition → bounded
//! concurrent fan-out over sub-queries → optional per-sub-query reranking →
//! dedup → merge (spec §4.7.4).
//!
//! Decomposition is a quality optimization like reranking: if it's disabled,
//! unavailable, or the LLM's output can't be parsed, the strategy falls back
//! to treating the query as a single turn rather than failing outright.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::external::{ChatMessage, ChatParams};
use crate::retrieval::{RetrievalContext, RetrievalStrategy};
use crate::types::{Chunk, RetrievalResult};

pub struct MultiTurnConfig {
    pub max_sub_queries: usize,
    pub complexity_threshold_chars: usize,
    pub min_query_length: usize,
    pub sub_query_top_k: usize,
    pub final_top_k: usize,
    pub initial_k: usize,
    pub enable_reranking: bool,
    pub dedup_similarity_threshold: f64,
    pub max_concurrent_sub_queries: usize,
}

impl Default for MultiTurnConfig {
    fn default() -> Self {
        Self {
            max_sub_queries: 3,
            complexity_threshold_chars: 50,
            min_query_length: 20,
            sub_query_top_k: 10,
            final_top_k: 10,
            initial_k: 30,
            enable_reranking: false,
            dedup_similarity_threshold: 0.95,
            max_concurrent_sub_queries: 3,
        }
    }
}

pub struct MultiTurnRag {
    pub config: MultiTurnConfig,
}

impl Default for MultiTurnRag {
    fn default() -> Self {
        Self { config: MultiTurnConfig::default() }
    }
}

#[async_trait]
impl RetrievalStrategy for MultiTurnRag {
    async fn retrieve(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let complex = is_complex(query, self.config.complexity_threshold_chars);

        if !complex {
            let mut result = self.run_base(ctx, query, top_k).await?;
            result.strategy_metadata.insert("strategy".into(), serde_json::json!("MultiTurnRAG"));
            result.strategy_metadata.insert("decomposed".into(), serde_json::json!(false));
            return Ok(result);
        }

        let Some(llm) = ctx.llm else {
            let mut result = self.run_base(ctx, query, top_k).await?;
            result.strategy_metadata.insert("strategy".into(), serde_json::json!("MultiTurnRAG"));
            result.strategy_metadata.insert("decomposed".into(), serde_json::json!(false));
            result.strategy_metadata.insert("fallback_reason".into(), serde_json::json!("no_llm_configured"));
            return Ok(result);
        };

        let sub_queries = match decompose(llm, query, self.config.max_sub_queries, self.config.min_query_length).await {
            Some(sub_queries) if !sub_queries.is_empty() => sub_queries,
            _ => {
                let mut result = self.run_base(ctx, query, top_k).await?;
                result.strategy_metadata.insert("strategy".into(), serde_json::json!("MultiTurnRAG"));
                result.strategy_metadata.insert("decomposed".into(), serde_json::json!(false));
                result.strategy_metadata.insert("fallback_reason".into(), serde_json::json!("decomposition_empty"));
                return Ok(result);
            }
        };

        let results = self.fan_out(ctx, &sub_queries).await;

        if results.iter().all(Option::is_none) {
            let mut result = self.run_base(ctx, query, top_k).await?;
            result.strategy_metadata.insert("strategy".into(), serde_json::json!("MultiTurnRAG"));
            result.strategy_metadata.insert("decomposed".into(), serde_json::json!(false));
            result.strategy_metadata.insert("fallback_reason".into(), serde_json::json!("no_embedder"));
            return Ok(result);
        }

        let mut all_docs: Vec<Chunk> = Vec::new();
        let mut all_scores: Vec<f32> = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut total_retrieved = 0usize;

        for result in results.into_iter().flatten() {
            total_retrieved += result.documents.len();
            for (doc, score) in result.documents.into_iter().zip(result.scores) {
                if seen_ids.insert(doc.id) {
                    all_docs.push(doc);
                    all_scores.push(score);
                }
            }
        }

        let (deduped_docs, deduped_scores) =
            dedupe_near_duplicates(all_docs, all_scores, self.config.dedup_similarity_threshold);

        let effective_top_k = top_k.min(self.config.final_top_k);
        let (final_docs, final_scores) = sort_and_truncate(deduped_docs, deduped_scores, effective_top_k);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("strategy".to_string(), serde_json::json!("MultiTurnRAG"));
        metadata.insert("decomposed".to_string(), serde_json::json!(true));
        metadata.insert("sub_queries".to_string(), serde_json::json!(sub_queries));
        metadata.insert("sub_queries_count".to_string(), serde_json::json!(sub_queries.len()));
        metadata.insert("total_retrieved".to_string(), serde_json::json!(total_retrieved));
        metadata.insert("final_count".to_string(), serde_json::json!(final_docs.len()));
        metadata.insert("dedup_threshold".to_string(), serde_json::json!(self.config.dedup_similarity_threshold));

        Ok(RetrievalResult { documents: final_docs, scores: final_scores, strategy_metadata: metadata })
    }
}

impl MultiTurnRag {
    /// Non-decomposed path: plain similarity search, optionally reranked
    /// against the full query text (spec §4.7.4 step 1 "simple" branch).
    async fn run_base(&self, ctx: &RetrievalContext<'_>, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let embedding = ctx.embedder.embed_one(query).await?;
        let scored = ctx.store.search(&embedding, top_k, ctx.metadata_filter).await?;
        let (documents, scores): (Vec<Chunk>, Vec<f32>) = scored.into_iter().unzip();

        if !self.config.enable_reranking {
            return Ok(RetrievalResult { documents, scores, strategy_metadata: Default::default() });
        }
        let (documents, scores) = maybe_rerank(ctx, query, documents, scores, top_k).await;
        Ok(RetrievalResult { documents, scores, strategy_metadata: Default::default() })
    }

    /// Run every sub-query concurrently as plain futures, gated by a
    /// `Semaphore` sized to `max_concurrent_sub_queries` so at most that many
    /// are in flight at once. Dispatch order is deterministic (input order);
    /// a failing sub-query contributes an empty result rather than aborting
    /// the batch (spec §4.7.4 step 3).
    async fn fan_out(&self, ctx: &RetrievalContext<'_>, sub_queries: &[String]) -> Vec<Option<RetrievalResult>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sub_queries.max(1)));
        let sub_query_top_k = self.config.sub_query_top_k;
        let enable_reranking = self.config.enable_reranking;
        let initial_k = self.config.initial_k;

        let mut futures = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            let semaphore = semaphore.clone();
            futures.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                retrieve_for_subquery(ctx, sub_query, sub_query_top_k, initial_k, enable_reranking).await.ok()
            });
        }

        futures::future::join_all(futures).await
    }
}

/// Length + conjunction/multi-question heuristics (spec §4.7.4): short
/// queries never decompose regardless of phrasing.
fn is_complex(query: &str, threshold_chars: usize) -> bool {
    if query.len() < threshold_chars {
        return false;
    }
    const MARKERS: &[&str] = &["and", "also", "additionally", "furthermore", "moreover"];
    let lower = query.to_lowercase();
    let has_marker = MARKERS.iter().any(|m| lower.split_whitespace().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == *m));
    let has_multiple_questions = lower.matches('?').count() >= 2;
    has_marker || has_multiple_questions
}

async fn decompose(
    llm: &dyn crate::external::LlmClient,
    query: &str,
    max_sub_queries: usize,
    min_query_length: usize,
) -> Option<Vec<String>> {
    let system_prompt = "Break complex questions into 2-3 simple questions.\n\n\
        Example:\n\
        Input: What are llama and alpaca fibers, and how do they compare?\n\
        Output:\n\
        <question>What is llama fiber?</question>\n\
        <question>What is alpaca fiber?</question>\n\
        <question>How do llama and alpaca fibers compare?</question>\n\n\
        Always use <question> tags. Be direct.";
    let user_prompt = format!("Input: {query}\nOutput:");

    let messages = [ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
    let params = ChatParams { temperature: Some(0.3), max_tokens: Some(200), stop: vec!["Input:".into(), "\n\n\n".into()] };

    let raw = match tokio::time::timeout(std::time::Duration::from_secs(20), llm.chat(&messages, &params)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            tracing::warn!("query decomposition call failed: {e}, treating as single-turn");
            return None;
        }
        Err(_) => {
            tracing::warn!("query decomposition timed out, treating as single-turn");
            return None;
        }
    };

    let stripped = strip_think_blocks(&raw);
    parse_questions(&stripped, max_sub_queries, min_query_length)
}

/// Strip `<think>…</think>` reasoning blocks some models prepend before the
/// actual answer (spec §4.7.4 step 2).
fn strip_think_blocks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        rest = &rest[start + "<think>".len()..];
        match rest.find("</think>") {
            Some(end) => rest = &rest[end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_questions(raw: &str, max_sub_queries: usize, min_query_length: usize) -> Option<Vec<String>> {
    let mut questions = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find("<question>") {
        let after_tag = &rest[start + "<question>".len()..];
        let Some(end) = after_tag.find("</question>") else { break };
        let question = after_tag[..end].trim();
        if question.len() >= min_query_length {
            questions.push(question.to_string());
        }
        rest = &after_tag[end + "</question>".len()..];
        if questions.len() >= max_sub_queries {
            break;
        }
    }
    if questions.is_empty() {
        None
    } else {
        Some(questions)
    }
}

async fn retrieve_for_subquery(
    ctx: &RetrievalContext<'_>,
    sub_query: &str,
    top_k: usize,
    initial_k: usize,
    enable_reranking: bool,
) -> Result<RetrievalResult> {
    let embedding = ctx.embedder.embed_one(sub_query).await?;
    let fetch_k = if enable_reranking { top_k.max(initial_k) } else { top_k };
    let scored = ctx.store.search(&embedding, fetch_k, ctx.metadata_filter).await?;
    let (documents, scores): (Vec<Chunk>, Vec<f32>) = scored.into_iter().unzip();

    if !enable_reranking {
        return Ok(RetrievalResult { documents, scores, strategy_metadata: Default::default() });
    }
    let (documents, scores) = maybe_rerank(ctx, sub_query, documents, scores, top_k).await;
    Ok(RetrievalResult { documents, scores, strategy_metadata: Default::default() })
}

/// Best-effort per-sub-query reranking: degrade to the unreranked order on
/// any reranker failure rather than failing the sub-query (spec §4.7.3, §5
/// "Best-effort degraded").
async fn maybe_rerank(
    ctx: &RetrievalContext<'_>,
    query_text: &str,
    documents: Vec<Chunk>,
    scores: Vec<f32>,
    top_k: usize,
) -> (Vec<Chunk>, Vec<f32>) {
    let Some(reranker) = ctx.reranker else {
        let mut paired: Vec<(Chunk, f32)> = documents.into_iter().zip(scores).collect();
        paired.truncate(top_k);
        return paired.into_iter().unzip();
    };

    let texts: Vec<String> = documents.iter().map(|c| c.content.clone()).collect();
    match tokio::time::timeout(std::time::Duration::from_secs(20), reranker.score(query_text, &texts)).await {
        Ok(Ok(rerank_scores)) if rerank_scores.len() == documents.len() => {
            let mut paired: Vec<(Chunk, f32)> = documents.into_iter().zip(rerank_scores).collect();
            paired.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            paired.truncate(top_k);
            for (position, (chunk, score)) in paired.iter_mut().enumerate() {
                chunk.meta_set("reranker_score", *score as f64);
                chunk.meta_set("rerank_position", position as i64);
            }
            paired.into_iter().unzip()
        }
        _ => {
            tracing::warn!("sub-query reranking failed or mismatched, keeping similarity order");
            let mut paired: Vec<(Chunk, f32)> = documents.into_iter().zip(scores).collect();
            paired.truncate(top_k);
            paired.into_iter().unzip()
        }
    }
}

/// Jaccard word-set similarity between two chunks' content (spec §4.7.4).
fn content_similarity(a: &str, b: &str) -> f64 {
    let wa: HashSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let wb: HashSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn dedupe_near_duplicates(docs: Vec<Chunk>, scores: Vec<f32>, threshold: f64) -> (Vec<Chunk>, Vec<f32>) {
    if docs.len() <= 1 || threshold >= 1.0 {
        return (docs, scores);
    }

    let mut kept_docs: Vec<Chunk> = Vec::new();
    let mut kept_scores: Vec<f32> = Vec::new();

    for (doc, score) in docs.into_iter().zip(scores) {
        let is_duplicate = kept_docs.iter().any(|existing| content_similarity(&doc.content, &existing.content) >= threshold);
        if !is_duplicate {
            kept_docs.push(doc);
            kept_scores.push(score);
        }
    }

    (kept_docs, kept_scores)
}

fn sort_and_truncate(docs: Vec<Chunk>, scores: Vec<f32>, top_k: usize) -> (Vec<Chunk>, Vec<f32>) {
    let mut paired: Vec<(Chunk, f32)> = docs.into_iter().zip(scores).collect();
    paired.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    paired.truncate(top_k);
    paired.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_query_is_never_complex() {
        assert!(!is_complex("short query", 50));
    }

    #[test]
    fn long_conjunction_query_is_complex() {
        let q = "What are llama and alpaca fibers, and how do they compare in warmth and cost?";
        assert!(is_complex(q, 50));
    }

    #[test]
    fn parses_tagged_questions() {
        let raw = "<question>What is llama fiber?</question>\n<question>What is alpaca fiber?</question>";
        let parsed = parse_questions(raw, 3, 5).unwrap();
        assert_eq!(parsed, vec!["What is llama fiber?", "What is alpaca fiber?"]);
    }

    #[test]
    fn unparseable_output_returns_none() {
        assert!(parse_questions("no tags here", 3, 5).is_none());
    }

    #[test]
    fn short_questions_below_min_length_are_discarded() {
        let raw = "<question>Hi?</question><question>What is llama fiber exactly?</question>";
        let parsed = parse_questions(raw, 3, 20).unwrap();
        assert_eq!(parsed, vec!["What is llama fiber exactly?"]);
    }

    #[test]
    fn think_blocks_are_stripped_before_parsing() {
        let raw = "<think>reasoning here</think><question>What is llama fiber?</question>";
        let stripped = strip_think_blocks(raw);
        assert_eq!(stripped, "<question>What is llama fiber?</question>");
    }

    #[test]
    fn jaccard_similarity_of_identical_text_is_one() {
        assert_eq!(content_similarity("the quick brown fox", "the quick brown fox"), 1.0);
    }

    #[test]
    fn jaccard_similarity_of_disjoint_text_is_zero() {
        assert_eq!(content_similarity("apples oranges", "bananas grapes"), 0.0);
    }
}

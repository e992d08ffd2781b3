//! Strategy & configuration resolver (spec §4.10, C10): turns a typed config
//! record into wired-up component trees for a named dataset. Strategies
//! never read `RagConfig` directly — the resolver is the only thing that
//! knows the global shape; everything downstream gets concrete values.

use std::sync::Arc;

use crate::config::{DataProcessingStrategyConfig, DatabaseConfig, ModelConfig, RagConfig, RetrievalStrategyType};
use crate::error::{RagError, Result};
use crate::processing::extractors::{self, document_type, entities, keywords, language, statistics, ExtractorChain};
use crate::processing::parser::ParserRegistry;
use crate::processing::parsers::{docx, excel, markdown, msg, pdf, text, universal};
use crate::retrieval::{BasicSimilarity, CrossEncoderReranked, MetadataFiltered, MultiTurnRag, RetrievalStrategy};
use crate::store::LanceStore;

/// A model reference resolved against `runtime.models` and flattened onto a
/// retrieval strategy, so the strategy itself never touches global config
/// (spec §4.10).
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model_base_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
}

pub struct ResolvedStrategy {
    pub parsers: ParserRegistry,
    pub extractors: ExtractorChain,
    pub config: DataProcessingStrategyConfig,
}

pub struct ResolvedDataset<'c> {
    pub strategy: ResolvedStrategy,
    pub database: &'c DatabaseConfig,
}

pub struct Resolver<'c> {
    config: &'c RagConfig,
}

impl<'c> Resolver<'c> {
    pub fn new(config: &'c RagConfig) -> Self {
        Self { config }
    }

    /// Resolve a dataset name into its processing strategy and database
    /// config (spec §4.10).
    pub fn resolve_dataset(&self, dataset_name: &str) -> Result<ResolvedDataset<'c>> {
        let dataset = self
            .config
            .dataset(dataset_name)
            .ok_or_else(|| RagError::NotFound(format!("dataset '{dataset_name}'")))?;

        let strategy_config = self
            .config
            .strategy(&dataset.data_processing_strategy_name)
            .ok_or_else(|| RagError::NotFound(format!("data processing strategy '{}'", dataset.data_processing_strategy_name)))?;

        let database = self
            .config
            .database(&dataset.database_name)
            .ok_or_else(|| RagError::NotFound(format!("database '{}'", dataset.database_name)))?;

        Ok(ResolvedDataset {
            strategy: ResolvedStrategy {
                parsers: build_parser_registry(strategy_config),
                extractors: build_extractor_chain(strategy_config),
                config: strategy_config.clone(),
            },
            database,
        })
    }

    /// Open the vector store backing `database` (spec §4.6, §4.10).
    pub async fn open_store(&self, database: &DatabaseConfig) -> Result<LanceStore> {
        let path = self.config.store_path(&database.name);
        LanceStore::open(&path, database.dimension).await
    }

    /// Build the concrete retrieval strategy instance named `strategy_name`
    /// for `database`, resolving its model reference if it has one (spec
    /// §4.7, §4.10).
    pub fn resolve_retrieval_strategy(
        &self,
        database: &DatabaseConfig,
        strategy_name: &str,
    ) -> Result<(Arc<dyn RetrievalStrategy>, Option<ResolvedModel>)> {
        let rs_config = database
            .retrieval_strategies
            .iter()
            .find(|rs| rs.name == strategy_name)
            .ok_or_else(|| RagError::NotFound(format!("retrieval strategy '{strategy_name}' on database '{}'", database.name)))?;

        let model = self.resolve_model_for(rs_config)?;

        let strategy: Arc<dyn RetrievalStrategy> = match rs_config.r#type {
            RetrievalStrategyType::BasicSimilarity => Arc::new(BasicSimilarity),
            RetrievalStrategyType::MetadataFiltered => Arc::new(MetadataFiltered),
            RetrievalStrategyType::CrossEncoderReranked => Arc::new(cross_encoder_from_config(rs_config)),
            RetrievalStrategyType::MultiTurnRag => Arc::new(multi_turn_from_config(rs_config)),
        };

        Ok((strategy, model))
    }

    /// Resolve the `model_name` a retrieval strategy config references
    /// against `runtime.models`, producing `model_base_url`/`model_id` the
    /// strategy can use without reading global config (spec §4.10).
    fn resolve_model_for(&self, rs_config: &crate::config::RetrievalStrategyConfig) -> Result<Option<ResolvedModel>> {
        let Some(model_name) = rs_config.config.get("model_name").and_then(|v| v.as_str()) else {
            return Ok(None);
        };

        let model: &ModelConfig = self
            .config
            .model(model_name)
            .ok_or_else(|| RagError::NotFound(format!("model '{model_name}' referenced by strategy '{}'", rs_config.name)))?;

        Ok(Some(ResolvedModel {
            model_base_url: model.base_url.clone(),
            model_id: model.model.clone(),
            api_key: model.api_key.clone(),
        }))
    }
}

fn config_usize(config: &std::collections::HashMap<String, serde_json::Value>, key: &str, default: usize) -> usize {
    config.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

fn config_f64(config: &std::collections::HashMap<String, serde_json::Value>, key: &str, default: f64) -> f64 {
    config.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn config_bool(config: &std::collections::HashMap<String, serde_json::Value>, key: &str, default: bool) -> bool {
    config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Build `CrossEncoderReranked` from a database's per-strategy config entry,
/// falling back to the built-in defaults for anything unset (spec §4.10).
fn cross_encoder_from_config(rs_config: &crate::config::RetrievalStrategyConfig) -> CrossEncoderReranked {
    CrossEncoderReranked {
        overfetch_factor: config_usize(&rs_config.config, "overfetch_factor", CrossEncoderReranked::default().overfetch_factor),
    }
}

/// Build `MultiTurnRag` from a database's per-strategy config entry, same
/// fallback rule as `cross_encoder_from_config`.
fn multi_turn_from_config(rs_config: &crate::config::RetrievalStrategyConfig) -> MultiTurnRag {
    let defaults = crate::retrieval::multi_turn::MultiTurnConfig::default();
    let config = crate::retrieval::multi_turn::MultiTurnConfig {
        max_sub_queries: config_usize(&rs_config.config, "max_sub_queries", defaults.max_sub_queries),
        complexity_threshold_chars: config_usize(&rs_config.config, "complexity_threshold_chars", defaults.complexity_threshold_chars),
        min_query_length: config_usize(&rs_config.config, "min_query_length", defaults.min_query_length),
        sub_query_top_k: config_usize(&rs_config.config, "sub_query_top_k", defaults.sub_query_top_k),
        final_top_k: config_usize(&rs_config.config, "final_top_k", defaults.final_top_k),
        initial_k: config_usize(&rs_config.config, "initial_k", defaults.initial_k),
        enable_reranking: config_bool(&rs_config.config, "enable_reranking", defaults.enable_reranking),
        dedup_similarity_threshold: config_f64(&rs_config.config, "dedup_similarity_threshold", defaults.dedup_similarity_threshold),
        max_concurrent_sub_queries: config_usize(&rs_config.config, "max_workers", defaults.max_concurrent_sub_queries),
    };
    MultiTurnRag { config }
}

/// Build a `ParserRegistry` from a strategy's declared parser entries. An
/// empty `parsers` list falls back to the built-in default registry so a
/// minimal config still produces a working pipeline.
fn build_parser_registry(strategy: &DataProcessingStrategyConfig) -> ParserRegistry {
    if strategy.parsers.is_empty() {
        return crate::processing::parsers::default_registry();
    }

    let mut registry = ParserRegistry::new();
    for entry in &strategy.parsers {
        let patterns: Vec<&str> = entry.file_include_patterns.iter().map(String::as_str).collect();
        registry = match entry.r#type.as_str() {
            "MarkdownParser" => registry.register(Box::new(markdown::MarkdownParser), &patterns, entry.priority),
            "PdfParser" => registry.register(Box::new(pdf::PdfParser), &patterns, entry.priority),
            "DocxParser" => registry.register(Box::new(docx::DocxParser), &patterns, entry.priority),
            "ExcelParser" => registry.register(Box::new(excel::ExcelParser), &patterns, entry.priority),
            "CsvParser" => registry.register(Box::new(text::CsvParser), &patterns, entry.priority),
            "MsgParser" => registry.register(Box::new(msg::MsgParser), &patterns, entry.priority),
            "TextParser" => registry.register(Box::new(text::TextParser), &patterns, entry.priority),
            "UniversalParser" => registry.register(Box::new(universal::UniversalParser), &patterns, entry.priority),
            unknown => {
                tracing::warn!("unknown parser type '{unknown}' in strategy '{}', skipping", strategy.name);
                registry
            }
        };
    }
    registry
}

fn build_extractor_chain(strategy: &DataProcessingStrategyConfig) -> ExtractorChain {
    if strategy.extractors.is_empty() {
        return extractors::default_chain();
    }

    let mut chain = ExtractorChain::new();
    for entry in &strategy.extractors {
        let patterns: Vec<&str> = entry.file_include_patterns.iter().map(String::as_str).collect();
        chain = match entry.r#type.as_str() {
            "StatisticsExtractor" => chain.register(Box::new(statistics::StatisticsExtractor), &patterns),
            "KeywordExtractor" => chain.register(Box::new(keywords::KeywordExtractor::default()), &patterns),
            "EntityExtractor" => chain.register(Box::new(entities::EntityExtractor), &patterns),
            "LanguageExtractor" => chain.register(Box::new(language::LanguageExtractor), &patterns),
            "DocumentTypeExtractor" => chain.register(Box::new(document_type::DocumentTypeExtractor), &patterns),
            unknown => {
                tracing::warn!("unknown extractor type '{unknown}' in strategy '{}', skipping", strategy.name);
                chain
            }
        };
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use std::collections::HashMap;

    fn sample_config() -> RagConfig {
        RagConfig {
            project_dir: "/tmp/rag-test".into(),
            datasets: vec![DatasetConfig {
                name: "docs".into(),
                data_processing_strategy_name: "default".into(),
                database_name: "main".into(),
                files: vec![],
                auto_process: None,
            }],
            data_processing_strategies: vec![DataProcessingStrategyConfig {
                name: "default".into(),
                parsers: vec![],
                extractors: vec![],
                chunking: ChunkingConfig::default(),
                retention: None,
            }],
            databases: vec![DatabaseConfig {
                name: "main".into(),
                r#type: "lancedb".into(),
                config: HashMap::new(),
                embedding_strategies: vec![],
                retrieval_strategies: vec![RetrievalStrategyConfig {
                    name: "basic".into(),
                    r#type: RetrievalStrategyType::BasicSimilarity,
                    config: HashMap::new(),
                }],
                default_embedding_strategy: "basic".into(),
                default_retrieval_strategy: "basic".into(),
                dimension: 384,
            }],
            runtime: RuntimeConfig::default(),
        }
    }

    #[test]
    fn resolves_dataset_to_strategy_and_database() {
        let config = sample_config();
        let resolver = Resolver::new(&config);
        let resolved = resolver.resolve_dataset("docs").unwrap();
        assert_eq!(resolved.database.name, "main");
    }

    #[test]
    fn unknown_dataset_is_not_found() {
        let config = sample_config();
        let resolver = Resolver::new(&config);
        let err = resolver.resolve_dataset("nope").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn resolves_retrieval_strategy_without_model() {
        let config = sample_config();
        let resolver = Resolver::new(&config);
        let (_strategy, model) = resolver.resolve_retrieval_strategy(&config.databases[0], "basic").unwrap();
        assert!(model.is_none());
    }
}

//! Typed configuration record (spec §6.5, §4.10).
//!
//! Mirrors the teacher's `RAGConfig`: `serde`-driven (de)serialization, a
//! `validate()` that rejects obviously broken values before any component is
//! built, and environment-aware `Default`s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub project_dir: PathBuf,
    pub datasets: Vec<DatasetConfig>,
    pub data_processing_strategies: Vec<DataProcessingStrategyConfig>,
    pub databases: Vec<DatabaseConfig>,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub data_processing_strategy_name: String,
    pub database_name: String,
    /// Source file paths this dataset ingests from, relative to `project_dir`
    /// (spec §3). Empty for datasets populated purely through the blob-upload
    /// ingestion path rather than a file list.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub auto_process: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProcessingStrategyConfig {
    pub name: String,
    pub parsers: Vec<ParserConfig>,
    #[serde(default)]
    pub extractors: Vec<ExtractorConfig>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Optional retention policy; `default_ttl_days` stamps an `expires_at`
    /// on every chunk this strategy produces (spec §4.4).
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub default_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Registry key, e.g. `"PdfParser"`, `"MarkdownParser"`.
    pub r#type: String,
    /// Case-insensitive filename globs this parser is a candidate for.
    /// Empty means "matches every file" (spec §4.1 step 1).
    #[serde(default)]
    pub file_include_patterns: Vec<String>,
    /// Lower runs first; ties broken by insertion order (spec §4.1 step 2).
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub r#type: String,
    #[serde(default)]
    pub file_include_patterns: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkStrategyName,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategyName::Paragraphs,
            chunk_size: 1000,
            chunk_overlap: 100,
            min_chunk_size: 50,
            max_chunk_size: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategyName {
    Semantic,
    Sections,
    Paragraphs,
    Sentences,
    Characters,
}

impl ChunkStrategyName {
    /// The enum name as persisted in chunk metadata (spec §3 `chunk_strategy`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategyName::Semantic => "semantic",
            ChunkStrategyName::Sections => "sections",
            ChunkStrategyName::Paragraphs => "paragraphs",
            ChunkStrategyName::Sentences => "sentences",
            ChunkStrategyName::Characters => "characters",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub r#type: String,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    pub embedding_strategies: Vec<String>,
    pub retrieval_strategies: Vec<RetrievalStrategyConfig>,
    pub default_embedding_strategy: String,
    pub default_retrieval_strategy: String,
    /// Embedding vector dimension for this database's collection.
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalStrategyConfig {
    pub name: String,
    pub r#type: RetrievalStrategyType,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategyType {
    BasicSimilarity,
    MetadataFiltered,
    CrossEncoderReranked,
    MultiTurnRag,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub models: Vec<ModelConfig>,
    /// Per-call timeout applied to every outbound collaborator call (spec §5).
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_api_parameters: HashMap<String, serde_json::Value>,
}

impl RagConfig {
    /// Validate config values, returning a human-readable error for anything
    /// clearly broken (spec §7 "Configuration" error class).
    pub fn validate(&self) -> Result<(), String> {
        for ds in &self.datasets {
            if !self
                .data_processing_strategies
                .iter()
                .any(|s| s.name == ds.data_processing_strategy_name)
            {
                return Err(format!(
                    "dataset '{}' references unknown data_processing_strategy '{}'",
                    ds.name, ds.data_processing_strategy_name
                ));
            }
            if !self.databases.iter().any(|d| d.name == ds.database_name) {
                return Err(format!(
                    "dataset '{}' references unknown database '{}'",
                    ds.name, ds.database_name
                ));
            }
        }

        for strategy in &self.data_processing_strategies {
            let c = &strategy.chunking;
            if c.chunk_size == 0 {
                return Err(format!("strategy '{}': chunk_size must be > 0", strategy.name));
            }
            if c.chunk_overlap >= c.chunk_size {
                return Err(format!(
                    "strategy '{}': chunk_overlap must be < chunk_size",
                    strategy.name
                ));
            }
            if c.min_chunk_size > c.chunk_size {
                return Err(format!(
                    "strategy '{}': min_chunk_size must be <= chunk_size",
                    strategy.name
                ));
            }
            if c.max_chunk_size < c.chunk_size {
                return Err(format!(
                    "strategy '{}': max_chunk_size must be >= chunk_size",
                    strategy.name
                ));
            }
        }

        for db in &self.databases {
            if db.dimension == 0 {
                return Err(format!("database '{}': dimension must be > 0", db.name));
            }
            for rs in &db.retrieval_strategies {
                if matches!(
                    rs.r#type,
                    RetrievalStrategyType::CrossEncoderReranked | RetrievalStrategyType::MultiTurnRag
                ) {
                    // These strategies may reference a model by name; if they do, it must resolve.
                    if let Some(model_name) = rs.config.get("model_name").and_then(|v| v.as_str()) {
                        if !self.runtime.models.iter().any(|m| m.name == model_name) {
                            return Err(format!(
                                "retrieval strategy '{}' references unknown model '{}'",
                                rs.name, model_name
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("failed to parse config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn strategy(&self, name: &str) -> Option<&DataProcessingStrategyConfig> {
        self.data_processing_strategies.iter().find(|s| s.name == name)
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|d| d.name == name)
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.runtime.models.iter().find(|m| m.name == name)
    }

    /// `<project_dir>/lf_data/stores/<database_name>` (spec §4.6, §6.1).
    pub fn store_path(&self, database_name: &str) -> PathBuf {
        self.project_dir.join("lf_data").join("stores").join(database_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> RagConfig {
        RagConfig {
            project_dir: PathBuf::from("/tmp/proj"),
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
                r#type: "content_addressed".into(),
                config: HashMap::new(),
                embedding_strategies: vec![],
                retrieval_strategies: vec![],
                default_embedding_strategy: "e".into(),
                default_retrieval_strategy: "r".into(),
                dimension: 384,
            }],
            runtime: RuntimeConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn unknown_strategy_reference_fails() {
        let mut cfg = minimal_config();
        cfg.datasets[0].data_processing_strategy_name = "missing".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overlap_too_large_fails() {
        let mut cfg = minimal_config();
        cfg.data_processing_strategies[0].chunking.chunk_overlap = 1000;
        cfg.data_processing_strategies[0].chunking.chunk_size = 100;
        assert!(cfg.validate().is_err());
    }
}

//! Core data model (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A scalar metadata value. Metadata is free-form string -> scalar, never nested
/// (spec §3: "free-form key -> scalar (string | number | boolean) mapping").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Number(f64),
    Bool(bool),
    StringList(Vec<String>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::String(s.to_string())
    }
}
impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::String(s)
    }
}
impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Number(n as f64)
    }
}
impl From<usize> for MetaValue {
    fn from(n: usize) -> Self {
        MetaValue::Number(n as f64)
    }
}
impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}
impl From<Vec<String>> for MetaValue {
    fn from(v: Vec<String>) -> Self {
        MetaValue::StringList(v)
    }
}

pub type Metadata = HashMap<String, MetaValue>;

/// The unit of storage and retrieval (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    pub source: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            source: source.into(),
            embedding: None,
            metadata: Metadata::new(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.metadata.insert(key.into(), value.into());
    }
}

/// Equality filter over chunk metadata (spec §4.6 `get_documents_by_metadata`,
/// §6.6 `search(..., metadata_filter)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter(pub HashMap<String, MetaValue>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact-equality match against a chunk's metadata (spec §4.6).
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.0.iter().all(|(k, v)| chunk.metadata.get(k) == Some(v))
    }
}

/// A raw uploaded file (spec §3 "File (blob)").
#[derive(Debug, Clone)]
pub struct FileBlob {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

impl FileBlob {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type: None,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// Collaborator-owned dataset record (spec §3), consumed by the ingestion driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub data_processing_strategy_name: String,
    pub database_name: String,
    pub files: Vec<String>,
    pub auto_process: Option<bool>,
}

/// Result of a retrieval call (spec §3, §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub documents: Vec<Chunk>,
    pub scores: Vec<f32>,
    pub strategy_metadata: HashMap<String, Value>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Invariant: `len(documents) == len(scores)` and scores non-increasing (spec §8.5).
    pub fn is_well_formed(&self) -> bool {
        if self.documents.len() != self.scores.len() {
            return false;
        }
        self.scores.windows(2).all(|w| w[0] >= w[1]) && self.scores.iter().all(|s| !s.is_nan())
    }
}

/// A single result row for the external search API (spec §6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub content: String,
    pub score: f32,
    pub metadata: Metadata,
    pub source: Option<String>,
}

/// Structured section extracted from a document with internal structure
/// (forms, tables) — supplements the flat-text chunking path (SPEC_FULL §C.2).
#[derive(Debug, Clone)]
pub enum DocumentSection {
    Text {
        content: String,
        page: usize,
        heading: Option<String>,
    },
    FormFields {
        fields: Vec<(String, String)>,
        page: usize,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        page: usize,
        caption: Option<String>,
    },
    Relationships {
        content: String,
    },
}

/// A parser's output before chunking: a (possibly singleton) ordered sequence
/// of labeled text fragments plus parser-attached metadata (spec §4.1).
#[derive(Debug, Clone)]
pub struct ParsedFragment {
    pub section_label: Option<String>,
    pub text: String,
    pub local_metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub fragments: Vec<ParsedFragment>,
    pub structured_sections: Vec<DocumentSection>,
    pub doc_metadata: Metadata,
}

//! Extractor chain (spec §4.3, C3): pure metadata enrichers run over each
//! chunk after chunking, routed the same way parsers are — glob + priority —
//! except every matching extractor runs (they don't compete for one winner).

pub mod document_type;
pub mod entities;
pub mod keywords;
pub mod language;
pub mod statistics;

use glob::Pattern;

use crate::error::Result;
use crate::types::{Chunk, MetaValue};

pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns metadata to merge into the chunk; never mutates `chunk` directly
    /// so an extractor can't see another extractor's output (spec §4.3:
    /// extractors run independently, in any order). A failing extractor is
    /// non-fatal to the chunk (spec §4.3, §5 "Best-effort degraded") —
    /// [`ExtractorChain::apply`] logs the failure and moves on to the next
    /// extractor rather than propagating it.
    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>>;
}

struct RegisteredExtractor {
    extractor: Box<dyn Extractor>,
    patterns: Vec<Pattern>,
}

#[derive(Default)]
pub struct ExtractorChain {
    entries: Vec<RegisteredExtractor>,
}

impl ExtractorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, extractor: Box<dyn Extractor>, patterns: &[&str]) -> Self {
        let patterns = patterns.iter().map(|p| Pattern::new(&p.to_lowercase()).expect("valid glob")).collect();
        self.entries.push(RegisteredExtractor { extractor, patterns });
        self
    }

    /// Run every extractor whose patterns match `chunk.source`, merging all
    /// their output into the chunk's metadata (spec §4.3). A failing
    /// extractor is logged and skipped; the chunk and every other
    /// extractor's output still go through.
    pub fn apply(&self, chunk: &mut Chunk) {
        let source = chunk.source.to_lowercase();
        for entry in &self.entries {
            if !entry.patterns.is_empty() && !entry.patterns.iter().any(|p| p.matches(&source)) {
                continue;
            }
            match entry.extractor.extract(chunk) {
                Ok(pairs) => {
                    for (key, value) in pairs {
                        chunk.metadata.insert(key, value);
                    }
                }
                Err(e) => {
                    tracing::warn!(extractor = entry.extractor.name(), error = %e, "extractor failed, chunk passed through unannotated");
                    chunk.meta_set("extractor_warning", format!("{} failed: {e}", entry.extractor.name()));
                }
            }
        }
    }
}

pub fn default_chain() -> ExtractorChain {
    ExtractorChain::new()
        .register(Box::new(statistics::StatisticsExtractor), &[])
        .register(Box::new(keywords::KeywordExtractor::default()), &[])
        .register(Box::new(entities::EntityExtractor), &[])
        .register(Box::new(language::LanguageExtractor), &[])
        .register(Box::new(document_type::DocumentTypeExtractor), &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    struct Tagger;
    impl Extractor for Tagger {
        fn name(&self) -> &'static str {
            "tagger"
        }
        fn extract(&self, _chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
            Ok(vec![("tagged".to_string(), true.into())])
        }
    }

    #[test]
    fn pattern_gating_skips_non_matching_sources() {
        let chain = ExtractorChain::new().register(Box::new(Tagger), &["*.pdf"]);
        let mut chunk = Chunk::new("hello", "file.txt");
        chain.apply(&mut chunk);
        assert!(chunk.meta_str("tagged").is_none());

        let mut pdf_chunk = Chunk::new("hello", "file.pdf");
        chain.apply(&mut pdf_chunk);
        assert!(pdf_chunk.metadata.get("tagged").and_then(|v| v.as_bool()).unwrap_or(false));
    }
}

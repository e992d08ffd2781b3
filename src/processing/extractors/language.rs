//! English-stopword-density heuristic language detection (spec §4.3). A
//! real language-id model is out of scope; this distinguishes "looks like
//! English prose" from "probably something else" well enough for metadata
//! filtering.

use crate::error::Result;
use crate::processing::extractors::Extractor;
use crate::types::{Chunk, MetaValue};

const ENGLISH_MARKERS: &[&str] = &["the", "and", "is", "of", "to", "in", "a", "that", "it", "for"];

pub struct LanguageExtractor;

impl Extractor for LanguageExtractor {
    fn name(&self) -> &'static str {
        "LanguageExtractor"
    }

    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
        let words: Vec<String> = chunk.content.split_whitespace().map(|w| w.to_lowercase()).collect();
        if words.is_empty() {
            return Ok(vec![("language".into(), "unknown".into())]);
        }

        let marker_hits = words.iter().filter(|w| ENGLISH_MARKERS.contains(&w.as_str())).count();
        let ratio = marker_hits as f64 / words.len() as f64;

        let language = if ratio > 0.03 { "en" } else { "unknown" };
        Ok(vec![("language".into(), language.into())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_english_prose() {
        let chunk = Chunk::new("The quick brown fox jumps over the lazy dog and it runs.", "doc.txt");
        let out = LanguageExtractor.extract(&chunk).unwrap();
        assert_eq!(out[0].1.as_str(), Some("en"));
    }

    #[test]
    fn low_marker_density_is_unknown() {
        let chunk = Chunk::new("xyzzy plugh frotz wibble wobble", "doc.txt");
        let out = LanguageExtractor.extract(&chunk).unwrap();
        assert_eq!(out[0].1.as_str(), Some("unknown"));
    }
}

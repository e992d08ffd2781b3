//! Parser registry and routing chain (spec §4.1, C1).
//!
//! Candidate selection is glob + priority, not dynamic class discovery: each
//! registered parser declares the filename patterns it is willing to try and
//! a priority (lower runs first). The registry tries candidates in priority
//! order and returns the first success, recording every failure along the way
//! so a total miss can report what was actually attempted.

use glob::Pattern;

use crate::error::{RagError, Result};
use crate::types::{FileBlob, ParsedDocument};

pub trait Parser: Send + Sync {
    /// Stable registry key, used in error messages and config references.
    fn name(&self) -> &'static str;

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument>;
}

struct RegisteredParser {
    parser: Box<dyn Parser>,
    patterns: Vec<Pattern>,
    priority: i32,
}

/// Ordered collection of parsers consulted for a given file (spec §4.1).
#[derive(Default)]
pub struct ParserRegistry {
    entries: Vec<RegisteredParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser. `patterns` are case-insensitive filename globs
    /// (`"*.pdf"`); an empty slice matches every file. `priority` breaks ties
    /// when multiple parsers match — lower runs first.
    pub fn register(mut self, parser: Box<dyn Parser>, patterns: &[&str], priority: i32) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(&p.to_lowercase()).expect("parser pattern must be a valid glob"))
            .collect();
        self.entries.push(RegisteredParser { parser, patterns, priority });
        self
    }

    fn candidates(&self, filename: &str) -> Vec<&RegisteredParser> {
        let lower = filename.to_lowercase();
        let mut matched: Vec<&RegisteredParser> = self
            .entries
            .iter()
            .filter(|e| e.patterns.is_empty() || e.patterns.iter().any(|p| p.matches(&lower)))
            .collect();
        matched.sort_by_key(|e| e.priority);
        matched
    }

    /// Route `blob` through matching parsers in priority order, returning the
    /// first success. Raises `UnsupportedFileType` if nothing matches, or
    /// `ParserFailed` if every matching parser errored (spec §4.1 Failures).
    pub fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        self.parse_with_name(blob).map(|(doc, _name)| doc)
    }

    /// Same as [`parse`](Self::parse), but also returns the name of the
    /// parser that produced the result — used by the preview handler to
    /// report `parser_used` (spec §4.8).
    pub fn parse_with_name(&self, blob: &FileBlob) -> Result<(ParsedDocument, &'static str)> {
        let candidates = self.candidates(&blob.filename);

        if candidates.is_empty() {
            return Err(RagError::UnsupportedFileType {
                filename: blob.filename.clone(),
                extension: blob.extension(),
                available_parsers: self.entries.iter().map(|e| e.parser.name().to_string()).collect(),
            });
        }

        let mut tried = Vec::new();
        let mut errors = Vec::new();

        for candidate in candidates {
            tried.push(candidate.parser.name().to_string());
            match candidate.parser.parse(blob) {
                Ok(doc) => return Ok((doc, candidate.parser.name())),
                Err(e) => errors.push(e.to_string()),
            }
        }

        Err(RagError::ParserFailed { filename: blob.filename.clone(), tried_parsers: tried, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    struct AlwaysOk(&'static str);
    impl Parser for AlwaysOk {
        fn name(&self) -> &'static str {
            self.0
        }
        fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
            Ok(ParsedDocument {
                fragments: vec![crate::types::ParsedFragment {
                    section_label: None,
                    text: String::from_utf8_lossy(&blob.bytes).into_owned(),
                    local_metadata: Metadata::new(),
                }],
                structured_sections: vec![],
                doc_metadata: Metadata::new(),
            })
        }
    }

    struct AlwaysErr(&'static str);
    impl Parser for AlwaysErr {
        fn name(&self) -> &'static str {
            self.0
        }
        fn parse(&self, _blob: &FileBlob) -> Result<ParsedDocument> {
            Err(RagError::StoreError("boom".into()))
        }
    }

    #[test]
    fn no_candidate_is_unsupported_file_type() {
        let registry = ParserRegistry::new().register(Box::new(AlwaysOk("text")), &["*.txt"], 0);
        let blob = FileBlob::new(b"hi".to_vec(), "file.pdf");
        let err = registry.parse(&blob).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedFileType");
    }

    #[test]
    fn priority_order_is_respected() {
        let registry = ParserRegistry::new()
            .register(Box::new(AlwaysErr("first")), &["*.txt"], 0)
            .register(Box::new(AlwaysOk("second")), &["*.txt"], 10);
        let blob = FileBlob::new(b"hi".to_vec(), "file.txt");
        let doc = registry.parse(&blob).unwrap();
        assert_eq!(doc.fragments[0].text, "hi");
    }

    #[test]
    fn all_matching_parsers_failing_is_parser_failed() {
        let registry = ParserRegistry::new().register(Box::new(AlwaysErr("broken")), &["*.txt"], 0);
        let blob = FileBlob::new(b"hi".to_vec(), "file.txt");
        let err = registry.parse(&blob).unwrap_err();
        assert_eq!(err.kind(), "ParserFailed");
    }

    #[test]
    fn empty_pattern_matches_everything() {
        let registry = ParserRegistry::new().register(Box::new(AlwaysOk("universal")), &[], 100);
        let blob = FileBlob::new(b"hi".to_vec(), "file.whatever");
        assert!(registry.parse(&blob).is_ok());
    }
}

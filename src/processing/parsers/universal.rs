//! Long-tail fallback parser (spec §9 "a generic parser as a catch-all for
//! unlisted extensions"). Registered with the lowest priority and an empty
//! pattern list so it only ever runs once every format-specific parser has
//! already failed or declined to match.
//!
//! Best-effort UTF-8 decoding with non-text byte stripping — no format
//! awareness, just "give the chunker something readable or say clearly that
//! there was nothing to extract".

use crate::error::Result;
use crate::processing::parser::Parser;
use crate::types::{FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct UniversalParser;

impl Parser for UniversalParser {
    fn name(&self) -> &'static str {
        "UniversalParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let text = String::from_utf8_lossy(&blob.bytes);
        let printable: String = text
            .chars()
            .map(|c| if c.is_control() && c != '\n' && c != '\t' { ' ' } else { c })
            .collect();

        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text: printable, local_metadata: Metadata::new() }],
            structured_sections: vec![],
            doc_metadata: Metadata::new(),
        })
    }
}

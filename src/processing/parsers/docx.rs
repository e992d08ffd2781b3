//! DOCX parser: unzip `word/document.xml` and pull text out of `<w:t>` runs,
//! paragraph by paragraph (spec §4.1).

use std::io::Read;

use regex::Regex;

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct DocxParser;

impl Parser for DocxParser {
    fn name(&self) -> &'static str {
        "DocxParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let cursor = std::io::Cursor::new(&blob.bytes);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| RagError::StoreError(format!("{} is not a valid zip/docx: {e}", blob.filename)))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|_| RagError::StoreError(format!("{} is missing word/document.xml", blob.filename)))?
            .read_to_string(&mut xml)
            .map_err(|e| RagError::StoreError(format!("reading document.xml: {e}")))?;

        let text = extract_paragraphs(&xml).join("\n\n");

        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text, local_metadata: Metadata::new() }],
            structured_sections: vec![],
            doc_metadata: Metadata::new(),
        })
    }
}

fn extract_paragraphs(xml: &str) -> Vec<String> {
    let paragraph_re = Regex::new(r"(?s)<w:p[ >].*?</w:p>").expect("static regex is valid");
    let run_re = Regex::new(r"(?s)<w:t[^>]*>(.*?)</w:t>").expect("static regex is valid");

    paragraph_re
        .find_iter(xml)
        .filter_map(|m| {
            let mut text = String::new();
            for cap in run_re.captures_iter(m.as_str()) {
                text.push_str(&cap[1]);
            }
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        })
        .collect()
}

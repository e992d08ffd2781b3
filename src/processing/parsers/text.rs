//! Plain-text and delimited-text parsers (spec §4.1).

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct TextParser;

impl Parser for TextParser {
    fn name(&self) -> &'static str {
        "TextParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let text = String::from_utf8(blob.bytes.clone())
            .map_err(|e| RagError::StoreError(format!("not valid UTF-8: {e}")))?;
        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text, local_metadata: Metadata::new() }],
            structured_sections: vec![],
            doc_metadata: Metadata::new(),
        })
    }
}

/// CSV/TSV rendered as one line of pipe-separated cells per row, matching the
/// flat-text shape the chunker and extractors expect (spec §4.1).
pub struct CsvParser;

impl Parser for CsvParser {
    fn name(&self) -> &'static str {
        "CsvParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let text = String::from_utf8(blob.bytes.clone())
            .map_err(|e| RagError::StoreError(format!("not valid UTF-8: {e}")))?;
        let delimiter = if blob.filename.to_lowercase().ends_with(".tsv") { '\t' } else { ',' };

        let mut rendered = String::new();
        let mut row_count = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(delimiter).collect();
            rendered.push_str(&cells.join(" | "));
            rendered.push('\n');
            row_count += 1;
        }

        let mut doc_metadata = Metadata::new();
        doc_metadata.insert("row_count".into(), (row_count as i64).into());

        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text: rendered, local_metadata: Metadata::new() }],
            structured_sections: vec![],
            doc_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_renders_pipe_separated_rows() {
        let blob = FileBlob::new(b"a,b,c\n1,2,3\n".to_vec(), "data.csv");
        let doc = CsvParser.parse(&blob).unwrap();
        assert_eq!(doc.fragments[0].text, "a | b | c\n1 | 2 | 3\n");
    }

    #[test]
    fn empty_csv_yields_no_rows() {
        let blob = FileBlob::new(b"\n\n".to_vec(), "data.csv");
        let doc = CsvParser.parse(&blob).unwrap();
        assert!(doc.fragments[0].text.trim().is_empty());
        assert_eq!(doc.doc_metadata.get("row_count").and_then(|v| v.as_f64()), Some(0.0));
    }
}

//! Markdown parser: splits on ATX headers (`#`..`######`) into labeled
//! fragments so the `sections` chunk strategy has real boundaries to work
//! with (spec §4.1, §4.2).

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct MarkdownParser;

impl Parser for MarkdownParser {
    fn name(&self) -> &'static str {
        "MarkdownParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let text = String::from_utf8(blob.bytes.clone())
            .map_err(|e| RagError::StoreError(format!("not valid UTF-8: {e}")))?;

        let mut fragments = Vec::new();
        let mut current_heading: Option<String> = None;
        let mut current_body = String::new();

        for line in text.lines() {
            if let Some(heading) = heading_text(line) {
                if !current_body.trim().is_empty() {
                    fragments.push(ParsedFragment {
                        section_label: current_heading.clone(),
                        text: current_body.trim().to_string(),
                        local_metadata: Metadata::new(),
                    });
                }
                current_heading = Some(heading);
                current_body.clear();
            } else {
                current_body.push_str(line);
                current_body.push('\n');
            }
        }
        if !current_body.trim().is_empty() {
            fragments.push(ParsedFragment {
                section_label: current_heading,
                text: current_body.trim().to_string(),
                local_metadata: Metadata::new(),
            });
        }

        if fragments.is_empty() {
            fragments.push(ParsedFragment { section_label: None, text, local_metadata: Metadata::new() });
        }

        Ok(ParsedDocument { fragments, structured_sections: vec![], doc_metadata: Metadata::new() })
    }
}

fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].trim();
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headers() {
        let md = "# Title\nintro text\n## Section A\nbody a\n## Section B\nbody b\n";
        let blob = FileBlob::new(md.as_bytes().to_vec(), "doc.md");
        let doc = MarkdownParser.parse(&blob).unwrap();
        assert_eq!(doc.fragments.len(), 3);
        assert_eq!(doc.fragments[1].section_label.as_deref(), Some("Section A"));
        assert_eq!(doc.fragments[1].text, "body a");
    }

    #[test]
    fn no_headers_is_single_fragment() {
        let blob = FileBlob::new(b"just prose, no headers here".to_vec(), "doc.md");
        let doc = MarkdownParser.parse(&blob).unwrap();
        assert_eq!(doc.fragments.len(), 1);
        assert!(doc.fragments[0].section_label.is_none());
    }
}

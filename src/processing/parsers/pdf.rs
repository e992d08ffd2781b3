//! PDF parser: `pdf-extract` first, falling back to `lopdf`'s raw content
//! streams when extraction looks garbled or comes back empty (spec §4.1,
//! SPEC_FULL §C.2 structured sections).

use crate::error::{RagError, Result};
use crate::processing::parser::Parser;
use crate::types::{DocumentSection, FileBlob, Metadata, ParsedDocument, ParsedFragment};

pub struct PdfParser;

impl Parser for PdfParser {
    fn name(&self) -> &'static str {
        "PdfParser"
    }

    fn parse(&self, blob: &FileBlob) -> Result<ParsedDocument> {
        let cleaned = extract_text(&blob.bytes).map_err(|e| RagError::StoreError(e.to_string()))?;

        let structured_sections = extract_structure(&blob.bytes, &cleaned);

        Ok(ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text: cleaned, local_metadata: Metadata::new() }],
            structured_sections,
            doc_metadata: Metadata::new(),
        })
    }
}

fn extract_text(bytes: &[u8]) -> anyhow::Result<String> {
    if let Ok(text) = pdf_extract::extract_text_from_mem(bytes) {
        let cleaned = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n");
        if !cleaned.is_empty() && column_garble_score(&cleaned) < 0.25 {
            return Ok(cleaned);
        }
        if !cleaned.is_empty() {
            tracing::debug!(garble_score = format!("{:.2}", column_garble_score(&cleaned)), "pdf extraction looks garbled, trying lopdf");
        }
    }

    if let Ok(doc) = lopdf::Document::load_mem(bytes) {
        let text = lopdf_page_text(&doc);
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }

    // pdf-extract may still have produced something, even if garbled; that
    // beats nothing.
    Ok(pdf_extract::extract_text_from_mem(bytes).unwrap_or_default())
}

/// Score how likely extracted text is garbled from multi-column merging: 0.0
/// (clean) to 1.0 (heavily garbled). pdf-extract concatenates unrelated
/// columns onto one line, leaving runs of 3+ spaces that normal prose never
/// has.
fn column_garble_score(text: &str) -> f64 {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 3 {
        return 0.0;
    }

    let mut garbled = 0usize;
    let mut scored = 0usize;
    for line in &lines {
        if line.len() < 15 {
            continue;
        }
        scored += 1;
        let gap_count = line.as_bytes().windows(3).filter(|w| w.iter().all(|&b| b == b' ')).count();
        let tab_count = line.chars().filter(|&c| c == '\t').count();
        if gap_count >= 1 || tab_count >= 2 {
            garbled += 1;
        }
    }

    if scored == 0 {
        0.0
    } else {
        garbled as f64 / scored as f64
    }
}

fn lopdf_page_text(doc: &lopdf::Document) -> String {
    let mut out = String::new();
    for (page_num, page_id) in doc.get_pages() {
        if let Ok(text) = doc.extract_text(&[page_num]) {
            let _ = page_id;
            out.push_str(&text);
            out.push('\n');
        }
    }
    out
}

/// Per-page `DocumentSection::Text` sections so downstream chunking can keep
/// page boundaries when the caller asks for structured chunking.
fn extract_structure(bytes: &[u8], fallback_content: &str) -> Vec<DocumentSection> {
    let Ok(doc) = lopdf::Document::load_mem(bytes) else {
        return Vec::new();
    };

    let mut sections = Vec::new();
    for (page_num, _page_id) in doc.get_pages() {
        if let Ok(text) = doc.extract_text(&[page_num]) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                sections.push(DocumentSection::Text {
                    content: trimmed.to_string(),
                    page: page_num as usize,
                    heading: None,
                });
            }
        }
    }

    if sections.is_empty() && !fallback_content.trim().is_empty() {
        sections.push(DocumentSection::Text { content: fallback_content.to_string(), page: 1, heading: None });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::column_garble_score;

    #[test]
    fn clean_prose_scores_low() {
        let text = "This is a normal sentence.\nAnother normal sentence follows here.\nAnd one more line of prose.";
        assert!(column_garble_score(text) < 0.25);
    }

    #[test]
    fn wide_gaps_score_high() {
        let text = "Column one text      column two text\nMore left text       more right text here\nThird row left       third row right";
        assert!(column_garble_score(text) >= 0.5);
    }
}

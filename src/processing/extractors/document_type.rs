//! Content-pattern document type classification (spec §4.3).

use crate::error::Result;
use crate::processing::extractors::Extractor;
use crate::types::{Chunk, MetaValue};

pub struct DocumentTypeExtractor;

impl Extractor for DocumentTypeExtractor {
    fn name(&self) -> &'static str {
        "DocumentTypeExtractor"
    }

    fn extract(&self, chunk: &Chunk) -> Result<Vec<(String, MetaValue)>> {
        let content_lower = chunk.content.to_lowercase();

        let document_type = if ["contract", "agreement", "terms"].iter().any(|t| content_lower.contains(t)) {
            "legal_document"
        } else if ["report", "analysis", "findings"].iter().any(|t| content_lower.contains(t)) {
            "report"
        } else if ["manual", "instructions", "guide"].iter().any(|t| content_lower.contains(t)) {
            "documentation"
        } else if ["email", "message", "correspondence"].iter().any(|t| content_lower.contains(t)) {
            "communication"
        } else {
            "general_document"
        };

        Ok(vec![("document_type".into(), document_type.into())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_legal_document() {
        let chunk = Chunk::new("This agreement sets out the terms between the parties.", "doc.txt");
        let out = DocumentTypeExtractor.extract(&chunk).unwrap();
        assert_eq!(out[0].1.as_str(), Some("legal_document"));
    }

    #[test]
    fn falls_back_to_general() {
        let chunk = Chunk::new("A short note about lunch plans.", "doc.txt");
        let out = DocumentTypeExtractor.extract(&chunk).unwrap();
        assert_eq!(out[0].1.as_str(), Some("general_document"));
    }
}

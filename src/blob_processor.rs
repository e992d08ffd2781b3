//! Blob processor (spec §4.5, C5): the single entry point that turns a raw
//! file into stamped, extracted chunks. No fallback policy — if no parser
//! matches or every matching parser fails, the error propagates rather than
//! silently producing zero chunks.

use crate::config::DataProcessingStrategyConfig;
use crate::error::Result;
use crate::lifecycle;
use crate::processing::chunker;
use crate::processing::extractors::ExtractorChain;
use crate::processing::parser::ParserRegistry;
use crate::types::{Chunk, FileBlob, ParsedDocument};

pub struct BlobProcessor<'a> {
    pub parsers: &'a ParserRegistry,
    pub extractors: &'a ExtractorChain,
}

/// Everything `process` threw away that the preview handler needs back
/// (spec §4.8): which parser ran, and the parsed document before chunking.
pub struct ProcessedBlob {
    pub parser_used: &'static str,
    pub parsed: ParsedDocument,
    pub chunks: Vec<Chunk>,
}

impl<'a> BlobProcessor<'a> {
    pub fn new(parsers: &'a ParserRegistry, extractors: &'a ExtractorChain) -> Self {
        Self { parsers, extractors }
    }

    /// Parse, chunk, extract, and stamp a blob. Never persists (persistence
    /// is the ingestion driver's job, so this same path can be reused by the
    /// preview handler without side effects — spec §4.5, §4.8).
    pub fn process(&self, blob: &FileBlob, strategy: &DataProcessingStrategyConfig) -> Result<Vec<Chunk>> {
        Ok(self.process_with_details(blob, strategy)?.chunks)
    }

    pub fn process_with_details(&self, blob: &FileBlob, strategy: &DataProcessingStrategyConfig) -> Result<ProcessedBlob> {
        let (parsed, parser_used) = self.parsers.parse_with_name(blob)?;

        let raw_chunks = if !parsed.structured_sections.is_empty() {
            chunker::chunk_structured(&parsed.structured_sections, &strategy.chunking)
        } else {
            chunker::chunk(&parsed, &strategy.chunking)
        };

        let mut chunks = chunker::to_chunks(raw_chunks, &blob.filename);
        for chunk in &mut chunks {
            for (key, value) in parsed.doc_metadata.clone() {
                chunk.metadata.entry(key).or_insert(value);
            }
            self.extractors.apply(chunk);
        }

        let stamp_ctx = lifecycle::StampContext {
            filename: &blob.filename,
            filepath: &blob.filename,
            parser: parser_used,
            chunk_strategy: strategy.chunking.strategy.as_str(),
            file_size: blob.bytes.len(),
            default_ttl_days: strategy.retention.as_ref().map(|r| r.default_ttl_days),
        };
        let chunks = lifecycle::stamp(chunks, &blob.bytes, &stamp_ctx);
        Ok(ProcessedBlob { parser_used, parsed, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::processing::extractors;
    use crate::processing::parsers;

    fn strategy() -> DataProcessingStrategyConfig {
        DataProcessingStrategyConfig {
            name: "default".into(),
            parsers: vec![],
            extractors: vec![],
            chunking: ChunkingConfig { chunk_size: 40, chunk_overlap: 5, min_chunk_size: 5, ..ChunkingConfig::default() },
            retention: None,
        }
    }

    #[test]
    fn processes_plain_text_into_stamped_chunks() {
        let registry = parsers::default_registry();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);

        let blob = FileBlob::new(b"Hello there, this is a reasonably long test document.".to_vec(), "doc.txt");
        let chunks = processor.process(&blob, &strategy()).unwrap();

        assert!(!chunks.is_empty());
        assert!(chunks[0].meta_str("file_hash").is_some());
        assert!(chunks[0].metadata.contains_key("word_count"));
    }

    #[test]
    fn unsupported_extension_with_no_fallback_match_errors() {
        let registry = ParserRegistry::new();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);
        let blob = FileBlob::new(b"whatever".to_vec(), "file.exotic");
        let err = processor.process(&blob, &strategy()).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedFileType");
    }
}

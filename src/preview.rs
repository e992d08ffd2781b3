//! Preview handler (spec §4.8, C8): an ingestion dry-run. Runs the exact same
//! parse → chunk → extract → stamp path as real ingestion, then maps each
//! chunk back onto the original text so a caller can see where a chunk came
//! from before committing to storing it. Never writes to the store.

use std::collections::HashMap;

use crate::blob_processor::BlobProcessor;
use crate::config::{ChunkStrategyName, ChunkingConfig, DataProcessingStrategyConfig};
use crate::error::{RagError, Result};
use crate::types::FileBlob;

#[derive(Debug, Clone, Default)]
pub struct PreviewOverrides {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub chunk_strategy: Option<ChunkStrategyName>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PreviewChunk {
    pub index: usize,
    pub content: String,
    pub start: i64,
    pub end: i64,
    pub char_count: usize,
    pub word_count: usize,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PreviewResult {
    pub original_text: String,
    pub chunks: Vec<PreviewChunk>,
    pub file_info: FileInfo,
    pub parser_used: String,
    pub chunk_strategy: ChunkStrategyName,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub total_chunks: usize,
    pub avg_chunk_size: f64,
    pub total_size_with_overlaps: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size_bytes: usize,
    pub content_type: Option<String>,
}

/// Run the blob processor on `blob` without persisting, then map chunks back
/// onto the original text (spec §4.8).
pub fn generate_preview(
    processor: &BlobProcessor<'_>,
    blob: &FileBlob,
    strategy: &DataProcessingStrategyConfig,
    overrides: &PreviewOverrides,
) -> Result<PreviewResult> {
    let strategy = apply_overrides(strategy, overrides);

    let processed = processor.process_with_details(blob, &strategy)?;

    if processed.chunks.is_empty() {
        return Err(RagError::InvalidArgument(format!(
            "preview of '{}' produced no chunks",
            blob.filename
        )));
    }

    let original_text = reconstruct_original_text(blob, &processed.parsed);

    let mut warnings = Vec::new();
    let mut cursor = 0usize;
    let mut preview_chunks = Vec::with_capacity(processed.chunks.len());
    let mut total_size_with_overlaps = 0usize;

    for (index, chunk) in processed.chunks.iter().enumerate() {
        let (start, end) = locate_chunk(&original_text, &chunk.content, cursor);
        if start >= 0 {
            cursor = end as usize;
        } else {
            warnings.push(format!("chunk {index} could not be located in the original text"));
        }

        total_size_with_overlaps += chunk.content.len();
        preview_chunks.push(PreviewChunk {
            index,
            content: chunk.content.clone(),
            start,
            end,
            char_count: chunk.content.chars().count(),
            word_count: chunk.content.split_whitespace().count(),
            metadata: chunk.metadata.clone(),
        });
    }

    let total_chunks = preview_chunks.len();
    let avg_chunk_size = preview_chunks.iter().map(|c| c.char_count).sum::<usize>() as f64 / total_chunks as f64;

    Ok(PreviewResult {
        original_text,
        chunks: preview_chunks,
        file_info: FileInfo {
            filename: blob.filename.clone(),
            size_bytes: blob.bytes.len(),
            content_type: blob.content_type.clone(),
        },
        parser_used: processed.parser_used.to_string(),
        chunk_strategy: strategy.chunking.strategy,
        chunk_size: strategy.chunking.chunk_size,
        chunk_overlap: strategy.chunking.chunk_overlap,
        total_chunks,
        avg_chunk_size,
        total_size_with_overlaps,
        warnings,
    })
}

fn apply_overrides(strategy: &DataProcessingStrategyConfig, overrides: &PreviewOverrides) -> DataProcessingStrategyConfig {
    let mut strategy = strategy.clone();
    if let Some(size) = overrides.chunk_size {
        strategy.chunking.chunk_size = size;
    }
    if let Some(overlap) = overrides.chunk_overlap {
        strategy.chunking.chunk_overlap = overlap;
    }
    if let Some(name) = overrides.chunk_strategy {
        strategy.chunking.strategy = name;
    }
    strategy
}

/// Best-effort full-text reconstruction (spec §4.8 step 3): prefer a clean
/// UTF-8 decode of the raw bytes when the parser's fragments look derived
/// from it (i.e. the parser did not synthesize structural markers); otherwise
/// fall back to concatenating the parser's own fragment text.
fn reconstruct_original_text(blob: &FileBlob, parsed: &crate::types::ParsedDocument) -> String {
    if let Ok(text) = std::str::from_utf8(&blob.bytes) {
        return text.to_string();
    }
    parsed.fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Substring search for `needle` in `haystack`, starting no earlier than
/// `from`. Returns `(-1, -1)` if not found — e.g. a parser inserted synthetic
/// content such as `"--- Page 1 ---"` that isn't present verbatim in the
/// original bytes (spec §9 design note).
fn locate_chunk(haystack: &str, needle: &str, from: usize) -> (i64, i64) {
    if needle.is_empty() {
        return (-1, -1);
    }
    let search_space = haystack.get(from..).unwrap_or("");
    match search_space.find(needle) {
        Some(offset) => {
            let start = from + offset;
            let end = start + needle.len();
            (start as i64, end as i64)
        }
        None => match haystack.find(needle) {
            Some(start) => (start as i64, (start + needle.len()) as i64),
            None => (-1, -1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::processing::{extractors, parsers};

    fn strategy() -> DataProcessingStrategyConfig {
        DataProcessingStrategyConfig {
            name: "default".into(),
            parsers: vec![],
            extractors: vec![],
            chunking: ChunkingConfig { chunk_size: 20, chunk_overlap: 2, min_chunk_size: 3, ..ChunkingConfig::default() },
            retention: None,
        }
    }

    #[test]
    fn preview_maps_chunks_back_onto_original_text() {
        let registry = parsers::default_registry();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);
        let blob = FileBlob::new(b"First paragraph of the document.\n\nSecond paragraph follows after it.".to_vec(), "doc.txt");

        let result = generate_preview(&processor, &blob, &strategy(), &PreviewOverrides::default()).unwrap();

        assert!(!result.chunks.is_empty());
        for chunk in &result.chunks {
            if chunk.start >= 0 {
                let slice = &result.original_text[chunk.start as usize..chunk.end as usize];
                assert_eq!(slice, chunk.content);
            }
        }
    }

    #[test]
    fn preview_never_persists_and_reports_parser_used() {
        let registry = parsers::default_registry();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);
        let blob = FileBlob::new(b"# Title\n\nSome body text that is long enough to chunk.".to_vec(), "doc.md");

        let result = generate_preview(&processor, &blob, &strategy(), &PreviewOverrides::default()).unwrap();
        assert!(!result.parser_used.is_empty());
    }

    #[test]
    fn overrides_change_effective_chunk_size() {
        let registry = parsers::default_registry();
        let chain = extractors::default_chain();
        let processor = BlobProcessor::new(&registry, &chain);
        let blob = FileBlob::new(b"Some reasonably long plain text content for chunking purposes here.".to_vec(), "doc.txt");

        let overrides = PreviewOverrides { chunk_size: Some(200), chunk_overlap: None, chunk_strategy: None };
        let result = generate_preview(&processor, &blob, &strategy(), &overrides).unwrap();
        assert_eq!(result.chunk_size, 200);
    }
}

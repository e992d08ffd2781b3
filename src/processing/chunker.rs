//! Chunking (spec §4.2, C2): a pure function over parsed document text, no
//! I/O, no store access. Five strategies share one sliding-window core;
//! `sections` and `semantic` differ only in where they look for break
//! points.

use tokenizers::tokenizer::Tokenizer;

use crate::config::{ChunkStrategyName, ChunkingConfig};
use crate::types::{Chunk, DocumentSection, ParsedDocument};

#[derive(Debug, Clone)]
pub struct RawChunk {
    pub text: String,
    pub heading: Option<String>,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Chunk a parsed document's flattened text per `config` (spec §4.2).
///
/// `sections` and `semantic` chunk each fragment independently so section
/// boundaries the parser already found (markdown headers, PDF pages) are
/// never merged across; `paragraphs`/`sentences`/`characters` flatten the
/// document into one stream first. Every path finishes through
/// [`force_split_oversized`] so no strategy can emit a chunk past
/// `max_chunk_size` (spec §4.2 "Chunk size contract").
pub fn chunk(doc: &ParsedDocument, config: &ChunkingConfig) -> Vec<RawChunk> {
    let raw = match config.strategy {
        ChunkStrategyName::Sections | ChunkStrategyName::Semantic => {
            let mut out = Vec::new();
            let mut cursor = 0usize;
            for fragment in &doc.fragments {
                let sub = sliding_window(&fragment.text, config, config.strategy == ChunkStrategyName::Semantic);
                for mut c in sub {
                    c.heading = c.heading.or_else(|| fragment.section_label.clone());
                    c.start_offset += cursor;
                    c.end_offset += cursor;
                    out.push(c);
                }
                cursor += fragment.text.len() + 1;
            }
            out
        }
        ChunkStrategyName::Paragraphs => {
            let flat = flatten(doc);
            paragraph_chunks(&flat, config)
        }
        ChunkStrategyName::Sentences => {
            let flat = flatten(doc);
            sentence_chunks(&flat, config)
        }
        ChunkStrategyName::Characters => {
            let flat = flatten(doc);
            character_chunks(&flat, config)
        }
    };
    force_split_oversized(raw, config)
}

/// Force-split any chunk longer than `max_chunk_size` using the `characters`
/// strategy, regardless of which strategy produced it (spec §4.2: "Chunks
/// longer than max_chunk_size are force-split with characters strategy").
fn force_split_oversized(chunks: Vec<RawChunk>, config: &ChunkingConfig) -> Vec<RawChunk> {
    let mut out = Vec::with_capacity(chunks.len());
    let force_split_config = ChunkingConfig {
        strategy: ChunkStrategyName::Characters,
        chunk_size: config.max_chunk_size,
        chunk_overlap: config.chunk_overlap.min(config.max_chunk_size.saturating_sub(1)),
        min_chunk_size: 1,
        max_chunk_size: config.max_chunk_size,
    };

    for c in chunks {
        if c.text.len() <= config.max_chunk_size {
            out.push(c);
            continue;
        }
        for mut piece in character_chunks(&c.text, &force_split_config) {
            piece.heading = piece.heading.or_else(|| c.heading.clone());
            piece.start_offset += c.start_offset;
            piece.end_offset += c.start_offset;
            out.push(piece);
        }
    }
    out
}

/// Sentence-boundary heuristic: a sentence ends at `.`/`!`/`?` followed by
/// whitespace and an uppercase letter (spec §4.2 "sentences" — the regex
/// `(?<=[.!?])\s+(?=[A-Z])` restated without lookaround, which the `regex`
/// crate doesn't support). Sentences are then greedily packed up to
/// `chunk_size`, same packing rule as `paragraphs`.
fn sentence_chunks(text: &str, config: &ChunkingConfig) -> Vec<RawChunk> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start: Option<usize> = None;
    let mut cursor = 0usize;

    for sentence in sentences {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            cursor += sentence.len();
            continue;
        }
        if buffer.len() + trimmed.len() > config.chunk_size && !buffer.is_empty() {
            push_if_large_enough(&mut chunks, &buffer, buffer_start.unwrap_or(0), cursor, config);
            buffer.clear();
            buffer_start = None;
        }
        if buffer.is_empty() {
            buffer_start = Some(cursor);
        } else {
            buffer.push(' ');
        }
        buffer.push_str(trimmed);
        cursor += sentence.len();
    }
    if !buffer.is_empty() {
        push_if_large_enough(&mut chunks, &buffer, buffer_start.unwrap_or(0), cursor, config);
    }
    chunks
}

/// Split `text` into sentence slices (including trailing whitespace, so
/// concatenating them reconstructs `text` exactly).
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'.' || b == b'!' || b == b'?' {
            let mut j = i + 1;
            let ws_start = j;
            while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                j += 1;
            }
            if j > ws_start && j < bytes.len() && (bytes[j] as char).is_ascii_uppercase() {
                sentences.push(&text[start..j]);
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn flatten(doc: &ParsedDocument) -> String {
    doc.fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// Build `Chunk`s out of `RawChunk`s, stamping `source` and carrying
/// `heading`/offset metadata (spec §4.2 output shape).
pub fn to_chunks(raw: Vec<RawChunk>, source: &str) -> Vec<Chunk> {
    raw.into_iter()
        .map(|r| {
            let mut chunk = Chunk::new(r.text, source);
            if let Some(h) = r.heading {
                chunk.meta_set("heading", h);
            }
            chunk.meta_set("start_offset", r.start_offset as i64);
            chunk.meta_set("end_offset", r.end_offset as i64);
            chunk
        })
        .collect()
}

/// Atomic chunking for parser-identified structured sections: form fields and
/// tables stay whole rather than being sliced by the sliding window
/// (SPEC_FULL §C.2).
pub fn chunk_structured(sections: &[DocumentSection], config: &ChunkingConfig) -> Vec<RawChunk> {
    let mut out = Vec::new();

    for section in sections {
        match section {
            DocumentSection::FormFields { fields, page } => {
                let body: String = fields
                    .iter()
                    .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                if body.is_empty() {
                    continue;
                }
                let heading = if *page > 0 { Some(format!("Form Data (Page {page})")) } else { Some("Form Data".to_string()) };
                out.push(RawChunk { text: body.clone(), heading, start_offset: 0, end_offset: body.len() });
            }
            DocumentSection::Table { headers, rows, caption, .. } => {
                let mut body = headers.join(" | ");
                body.push('\n');
                for row in rows {
                    body.push_str(&row.join(" | "));
                    body.push('\n');
                }
                out.push(RawChunk { text: body.trim().to_string(), heading: caption.clone(), start_offset: 0, end_offset: 0 });
            }
            DocumentSection::Relationships { content } => {
                if !content.trim().is_empty() {
                    out.push(RawChunk { text: content.clone(), heading: Some("Relationships".into()), start_offset: 0, end_offset: 0 });
                }
            }
            DocumentSection::Text { content, page, heading } => {
                let sub = sliding_window(content, config, false);
                for mut c in sub {
                    c.heading = c.heading.or_else(|| heading.clone()).or(Some(format!("Page {page}")));
                    out.push(c);
                }
            }
        }
    }

    out
}

fn sliding_window(text: &str, config: &ChunkingConfig, token_aware: bool) -> Vec<RawChunk> {
    if token_aware {
        if let Some(chunks) = token_aware_window(text, config) {
            return chunks;
        }
    }

    if text.len() <= config.chunk_size {
        if text.len() < config.min_chunk_size {
            return Vec::new();
        }
        return vec![RawChunk { text: text.to_string(), heading: extract_heading(text), start_offset: 0, end_offset: text.len() }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let raw_end = (start + config.chunk_size).min(text.len());
        let end = snap_to_char_boundary(text, raw_end);
        let actual_end = if end < text.len() { find_break_point(text, start, end) } else { end };

        let chunk_text = &text[start..actual_end];
        if chunk_text.len() >= config.min_chunk_size {
            chunks.push(RawChunk {
                text: chunk_text.to_string(),
                heading: extract_heading(chunk_text),
                start_offset: start,
                end_offset: actual_end,
            });
        }

        let step = if actual_end > start + config.chunk_overlap { actual_end - start - config.chunk_overlap } else { actual_end - start };
        let raw_next = start + step.max(1);
        start = snap_to_char_boundary(text, raw_next);
        if start >= text.len() {
            break;
        }
    }

    chunks
}

/// "Semantic" strategy: split by token count via the configured tokenizer so
/// chunk boundaries line up with the embedder's actual token budget rather
/// than a byte-length guess. Falls back to the byte sliding window if no
/// tokenizer is available (spec §4.2 "semantic").
fn token_aware_window(text: &str, config: &ChunkingConfig) -> Option<Vec<RawChunk>> {
    let tokenizer = default_tokenizer()?;
    let encoding = tokenizer.encode(text, false).ok()?;
    let offsets = encoding.get_offsets();
    if offsets.is_empty() {
        return None;
    }

    let mut chunks = Vec::new();
    let mut token_start = 0usize;

    while token_start < offsets.len() {
        let token_end = (token_start + config.chunk_size).min(offsets.len());
        let byte_start = offsets[token_start].0;
        let byte_end = offsets[token_end - 1].1;
        let slice = &text[byte_start..byte_end];

        if slice.len() >= config.min_chunk_size || token_end == offsets.len() {
            chunks.push(RawChunk {
                text: slice.to_string(),
                heading: extract_heading(slice),
                start_offset: byte_start,
                end_offset: byte_end,
            });
        }

        if token_end >= offsets.len() {
            break;
        }
        let overlap_tokens = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));
        token_start = token_end.saturating_sub(overlap_tokens).max(token_start + 1);
    }

    Some(chunks)
}

/// Loads a bundled tokenizer definition from the local cache directory
/// (`<cache_dir>/rag-data-plane/tokenizer.json`) rather than reaching out to
/// a model hub. Absent file falls back to `None`, which sends chunking back
/// to the byte sliding window.
fn default_tokenizer() -> Option<Tokenizer> {
    let path = dirs::cache_dir()?.join("rag-data-plane").join("tokenizer.json");
    Tokenizer::from_file(&path).ok()
}

fn paragraph_chunks(text: &str, config: &ChunkingConfig) -> Vec<RawChunk> {
    let mut chunks = Vec::new();
    let mut cursor = 0usize;
    let mut buffer = String::new();
    let mut buffer_start = 0usize;

    for paragraph in text.split("\n\n") {
        if buffer.len() + paragraph.len() > config.chunk_size && !buffer.is_empty() {
            push_if_large_enough(&mut chunks, &buffer, buffer_start, cursor, config);
            buffer.clear();
            buffer_start = cursor;
        }
        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(paragraph);
        cursor += paragraph.len() + 2;
    }
    if !buffer.is_empty() {
        push_if_large_enough(&mut chunks, &buffer, buffer_start, cursor, config);
    }
    chunks
}

fn push_if_large_enough(chunks: &mut Vec<RawChunk>, text: &str, start: usize, end: usize, config: &ChunkingConfig) {
    if text.len() >= config.min_chunk_size {
        chunks.push(RawChunk { text: text.to_string(), heading: extract_heading(text), start_offset: start, end_offset: end });
    }
}

fn character_chunks(text: &str, config: &ChunkingConfig) -> Vec<RawChunk> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < text.len() {
        let raw_end = (start + config.chunk_size).min(text.len());
        let end = snap_to_char_boundary(text, raw_end);
        let slice = &text[start..end];
        if slice.len() >= config.min_chunk_size {
            chunks.push(RawChunk { text: slice.to_string(), heading: None, start_offset: start, end_offset: end });
        }
        let step = if end > start + config.chunk_overlap { end - start - config.chunk_overlap } else { end - start };
        start = snap_to_char_boundary(text, start + step.max(1));
    }
    chunks
}

fn find_break_point(text: &str, start: usize, preferred_end: usize) -> usize {
    let raw_search_start = preferred_end.saturating_sub(200).max(start);
    let search_start = snap_to_char_boundary(text, raw_search_start);
    let safe_end = snap_to_char_boundary(text, preferred_end);
    if search_start >= safe_end {
        return safe_end;
    }
    let region = &text[search_start..safe_end];

    if let Some(pos) = region.rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind(". ") {
        return search_start + pos + 2;
    }
    if let Some(pos) = region.rfind('\n') {
        return search_start + pos + 1;
    }
    if let Some(pos) = region.rfind(' ') {
        return search_start + pos + 1;
    }
    safe_end
}

fn extract_heading(text: &str) -> Option<String> {
    let first_line = text.lines().next()?;
    first_line.starts_with('#').then(|| first_line.trim_start_matches('#').trim().to_string())
}

fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, ParsedFragment};

    fn doc_from(text: &str) -> ParsedDocument {
        ParsedDocument {
            fragments: vec![ParsedFragment { section_label: None, text: text.to_string(), local_metadata: Metadata::new() }],
            structured_sections: vec![],
            doc_metadata: Metadata::new(),
        }
    }

    fn config(strategy: ChunkStrategyName) -> ChunkingConfig {
        ChunkingConfig { strategy, chunk_size: 50, chunk_overlap: 10, min_chunk_size: 5, max_chunk_size: 200 }
    }

    #[test]
    fn short_text_is_single_chunk() {
        let doc = doc_from("short text");
        let chunks = chunk(&doc, &config(ChunkStrategyName::Characters));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let text = "word ".repeat(40);
        let doc = doc_from(&text);
        let chunks = chunk(&doc, &config(ChunkStrategyName::Characters));
        assert!(chunks.len() > 1);
        assert!(chunks.windows(2).all(|w| w[1].start_offset < w[0].end_offset));
    }

    #[test]
    fn paragraph_strategy_respects_blank_lines() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let doc = doc_from(&text);
        let chunks = chunk(&doc, &config(ChunkStrategyName::Paragraphs));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn tiny_fragment_below_minimum_is_dropped() {
        let doc = doc_from("hi");
        let chunks = chunk(&doc, &config(ChunkStrategyName::Characters));
        assert!(chunks.is_empty());
    }

    #[test]
    fn sentence_strategy_splits_on_sentence_boundaries() {
        let doc = doc_from("Hello world. This is a test.");
        let mut cfg = config(ChunkStrategyName::Sentences);
        cfg.chunk_size = 20;
        cfg.min_chunk_size = 1;
        let chunks = chunk(&doc, &cfg);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Hello world.");
        assert_eq!(chunks[1].text, "This is a test.");
    }

    #[test]
    fn sentence_strategy_packs_short_sentences_together() {
        let doc = doc_from("One. Two. Three.");
        let mut cfg = config(ChunkStrategyName::Sentences);
        cfg.chunk_size = 1000;
        cfg.min_chunk_size = 1;
        let chunks = chunk(&doc, &cfg);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "One. Two. Three.");
    }

    #[test]
    fn no_chunk_exceeds_max_chunk_size() {
        let text = "x".repeat(500);
        let doc = doc_from(&text);
        let mut cfg = config(ChunkStrategyName::Paragraphs);
        cfg.chunk_size = 1000; // larger than max, so paragraph packing alone wouldn't split
        cfg.max_chunk_size = 100;
        let chunks = chunk(&doc, &cfg);
        assert!(chunks.iter().all(|c| c.text.len() <= cfg.max_chunk_size));
    }
}

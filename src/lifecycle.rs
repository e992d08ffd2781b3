//! Document lifecycle manager (spec §4.4, C4): stamps content-addressing,
//! identity, and timestamp metadata onto chunks at ingestion time, and
//! deletes by `file_hash` as the primary removal path.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::hashing;
use crate::store::VectorStore;
use crate::types::{Chunk, MetadataFilter};

/// Everything the stamping step needs beyond the chunk list itself: which
/// file they came from, which parser and chunk strategy produced them, and
/// an optional retention policy (spec §3, §4.4).
#[derive(Debug, Clone)]
pub struct StampContext<'a> {
    pub filename: &'a str,
    pub filepath: &'a str,
    pub parser: &'a str,
    pub chunk_strategy: &'a str,
    pub file_size: usize,
    /// `retention.default_ttl_days`, if the strategy configures one (spec §4.4).
    pub default_ttl_days: Option<i64>,
}

/// Stamp a freshly-parsed-and-chunked set of chunks with hashes, identity,
/// and timestamps before they reach the store (spec §4.4, §3 "Required
/// metadata keys").
///
/// `file_hash` is shared across every chunk of the same file; `chunk_hash`
/// and `metadata_hash` are per-chunk. `id` is re-derived as a composite of
/// `(file_hash, chunk_index)` so re-ingesting identical bytes produces the
/// same chunk ids (idempotent `add_documents`, spec §8).
pub fn stamp(mut chunks: Vec<Chunk>, file_bytes: &[u8], ctx: &StampContext<'_>) -> Vec<Chunk> {
    let file_hash = hashing::file_hash(file_bytes);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let total_chunks = chunks.len();
    let doc_id = hashing::composite_hash(&[&file_hash]);

    let expires_at = ctx.default_ttl_days.map(|days| {
        (Utc::now() + chrono::Duration::days(days)).to_rfc3339_opts(SecondsFormat::Millis, true)
    });

    for (index, chunk) in chunks.iter_mut().enumerate() {
        let composite = hashing::composite_hash(&[&file_hash, &index.to_string()]);
        let chunk_id = uuid_from_hash(&composite);
        chunk.id = chunk_id;

        chunk.meta_set("file_hash", file_hash.clone());
        chunk.meta_set("chunk_hash", hashing::chunk_hash(&chunk.content));
        chunk.meta_set("doc_id", doc_id.clone());
        chunk.meta_set("chunk_id", chunk_id.to_string());
        chunk.meta_set("filename", ctx.filename.to_string());
        chunk.meta_set("filepath", ctx.filepath.to_string());
        chunk.meta_set("file_size", ctx.file_size as i64);
        chunk.meta_set("parser", ctx.parser.to_string());
        chunk.meta_set("chunk_strategy", ctx.chunk_strategy.to_string());
        chunk.meta_set("chunk_index", index as i64);
        chunk.meta_set("total_chunks", total_chunks as i64);
        chunk.meta_set("created_at", now.clone());
        chunk.meta_set("updated_at", now.clone());
        chunk.meta_set("indexed_at", now.clone());
        chunk.meta_set("version", 1i64);
        chunk.meta_set("is_active", true);
        if let Some(expires_at) = &expires_at {
            chunk.meta_set("expires_at", expires_at.clone());
        }

        let metadata_hash = hashing::metadata_hash(&chunk.metadata);
        chunk.meta_set("metadata_hash", metadata_hash);
    }

    chunks
}

/// Derive a deterministic UUID from a hash string so identical inputs always
/// produce the same chunk id (spec §8 idempotency invariant).
fn uuid_from_hash(hash: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, hash.as_bytes())
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DeletionResult {
    pub file_hash: String,
    pub deleted_count: usize,
}

/// Delete every chunk carrying `file_hash`, idempotently (spec §4.4): deleting
/// a `file_hash` with no matching chunks is a no-op, not an error.
pub async fn delete_by_file_hash(store: &dyn VectorStore, file_hash: &str) -> Result<DeletionResult> {
    let filter = MetadataFilter::new().with("file_hash", file_hash);
    let documents = store.get_documents_by_metadata(&filter).await?;

    if documents.is_empty() {
        return Ok(DeletionResult { file_hash: file_hash.to_string(), deleted_count: 0 });
    }

    let ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();
    let deleted_count = store.delete_documents(&ids).await?;

    Ok(DeletionResult { file_hash: file_hash.to_string(), deleted_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn ctx<'a>() -> StampContext<'a> {
        StampContext {
            filename: "doc.txt",
            filepath: "doc.txt",
            parser: "TextParser",
            chunk_strategy: "characters",
            file_size: 24,
            default_ttl_days: None,
        }
    }

    #[test]
    fn stamping_is_idempotent_across_identical_bytes() {
        let bytes = b"identical file contents";
        let a = stamp(vec![Chunk::new("chunk text", "doc.txt")], bytes, &ctx());
        let b = stamp(vec![Chunk::new("chunk text", "doc.txt")], bytes, &ctx());
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].meta_str("file_hash"), b[0].meta_str("file_hash"));
    }

    #[test]
    fn different_content_gets_different_chunk_hash() {
        let bytes = b"file bytes";
        let chunks = stamp(vec![Chunk::new("first chunk", "doc.txt"), Chunk::new("second chunk", "doc.txt")], bytes, &ctx());
        assert_ne!(chunks[0].meta_str("chunk_hash"), chunks[1].meta_str("chunk_hash"));
        assert_eq!(chunks[0].meta_str("file_hash"), chunks[1].meta_str("file_hash"));
    }

    #[test]
    fn chunk_index_and_total_chunks_cover_the_full_range() {
        let bytes = b"three separate chunks of content";
        let chunks = stamp(
            vec![Chunk::new("a", "doc.txt"), Chunk::new("b", "doc.txt"), Chunk::new("c", "doc.txt")],
            bytes,
            &ctx(),
        );
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.get("chunk_index").and_then(|v| v.as_f64()), Some(i as f64));
            assert_eq!(chunk.metadata.get("total_chunks").and_then(|v| v.as_f64()), Some(3.0));
        }
    }

    #[test]
    fn timestamps_carry_an_explicit_trailing_z() {
        let chunks = stamp(vec![Chunk::new("x", "doc.txt")], b"bytes", &ctx());
        let created = chunks[0].meta_str("created_at").unwrap();
        assert!(created.ends_with('Z'), "expected trailing Z, got {created}");
    }

    #[test]
    fn retention_policy_stamps_expires_at() {
        let mut c = ctx();
        c.default_ttl_days = Some(30);
        let chunks = stamp(vec![Chunk::new("x", "doc.txt")], b"bytes", &c);
        assert!(chunks[0].meta_str("expires_at").is_some());
    }
}

//! Content-addressing primitives (spec §4.4).
//!
//! All hashes are algorithm-tagged (`"sha256:<hex>"`) so a future migration to
//! a different algorithm only requires stamping new chunks under a new tag;
//! existing chunks stay queryable by their original tag (spec §9 "Hashing
//! algorithm migration").

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;

use crate::types::{MetaValue, Metadata};

const ALGORITHM: &str = "sha256";
const STREAM_BLOCK_SIZE: usize = 8192;

fn tag(hex: String) -> String {
    format!("{ALGORITHM}:{hex}")
}

/// Streaming hash of file bytes, 8 KiB blocks (spec §4.4).
pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    let mut cursor = bytes;
    let mut buf = [0u8; STREAM_BLOCK_SIZE];
    loop {
        let n = cursor.read(&mut buf).expect("reading from a slice cannot fail");
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    tag(hex::encode(hasher.finalize()))
}

/// Normalise content for hashing: trim, lowercase, collapse whitespace runs
/// (spec §4.4, §8 invariant 4).
pub fn normalise(content: &str) -> String {
    content.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash of `normalise(content)` (spec §4.4).
pub fn chunk_hash(content: &str) -> String {
    let normalised = normalise(content);
    let mut hasher = Sha256::new();
    hasher.update(normalised.as_bytes());
    tag(hex::encode(hasher.finalize()))
}

/// Hash of metadata serialised with sorted keys, excluding timestamp and
/// self-referential keys (spec §4.4).
pub fn metadata_hash(metadata: &Metadata) -> String {
    const EXCLUDED: &[&str] = &["created_at", "updated_at", "indexed_at", "metadata_hash"];

    let sorted: BTreeMap<&str, &MetaValue> = metadata
        .iter()
        .filter(|(k, _)| !EXCLUDED.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v))
        .collect();

    let serialised = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialised.as_bytes());
    tag(hex::encode(hasher.finalize()))
}

/// Combine multiple hash components deterministically, used to derive a
/// chunk `id` from `(file_hash, chunk_index)` so re-processing identical
/// bytes is idempotent (spec §8 invariant: `add_documents` idempotency).
pub fn composite_hash(components: &[&str]) -> String {
    let combined = components.join("|");
    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    tag(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_is_normalised() {
        let a = chunk_hash("Hello   World");
        let b = chunk_hash("  hello world  ");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_hash_differs_on_real_difference() {
        let a = chunk_hash("hello world");
        let b = chunk_hash("hello there");
        assert_ne!(a, b);
    }

    #[test]
    fn file_hash_is_tagged() {
        let h = file_hash(b"some bytes");
        assert!(h.starts_with("sha256:"));
    }

    #[test]
    fn metadata_hash_ignores_timestamps() {
        let mut m1 = Metadata::new();
        m1.insert("a".into(), MetaValue::String("x".into()));
        m1.insert("created_at".into(), MetaValue::String("t0".into()));

        let mut m2 = Metadata::new();
        m2.insert("a".into(), MetaValue::String("x".into()));
        m2.insert("created_at".into(), MetaValue::String("t1".into()));

        assert_eq!(metadata_hash(&m1), metadata_hash(&m2));
    }
}

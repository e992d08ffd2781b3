//! Vector store abstraction (spec §4.6, C6): every concrete backend offers
//! the same five operations. Content addressing is the store's contract,
//! not a concrete backend's implementation detail — `file_hash`/`chunk_hash`
//! live in chunk metadata and every backend must let callers filter on them.

pub mod lance;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Chunk, MetadataFilter};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks, each of which must already carry an `embedding` (spec §4.6).
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<Vec<Uuid>>;

    /// Cosine-similarity nearest-neighbor search, optionally narrowed by an
    /// equality metadata filter (spec §4.6, §4.7). Each result pairs the
    /// chunk with its similarity score — the score is a property of this
    /// particular query, not of the chunk, so it never lives in
    /// `Chunk::metadata`.
    async fn search(&self, query_embedding: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<(Chunk, f32)>>;

    /// Exact-equality metadata lookup, no vector involved (spec §4.4, §4.6).
    async fn get_documents_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>>;

    /// Delete by id, returning the count actually removed (spec §4.4, §4.6).
    async fn delete_documents(&self, ids: &[Uuid]) -> Result<usize>;

    async fn delete_collection(&self) -> Result<()>;

    /// Paginated enumeration of the whole collection (spec §4.6). Returns the
    /// page alongside the collection's total row count so callers can compute
    /// whether more pages remain without a second round-trip. `include_content`
    /// false omits `content` from each returned chunk to keep listing calls
    /// cheap when only metadata is needed.
    async fn list_documents(&self, limit: usize, offset: usize, include_content: bool) -> Result<(Vec<Chunk>, usize)>;
}

pub use lance::LanceStore;

//! RAG data plane: ingestion, chunking, content-addressed vector storage,
//! and multi-strategy retrieval (spec §1-§2). This crate owns the data
//! plane only — model inference (embedding, generation, reranking) is
//! consumed through the traits in [`external`], never run in-process.

pub mod blob_processor;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod hashing;
pub mod ingest;
pub mod lifecycle;
pub mod preview;
pub mod processing;
pub mod resolver;
pub mod retrieval;
pub mod store;
pub mod types;

pub use error::{RagError, Result};

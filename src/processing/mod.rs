//! Ingestion-time document processing: parsing, chunking, extraction.

pub mod chunker;
pub mod extractors;
pub mod parser;
pub mod parsers;

pub use chunker::chunk;
pub use parser::{Parser, ParserRegistry};

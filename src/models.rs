//! Core data models used throughout Carrel.
//!
//! These types represent the extracted records, chunks, and retrieval
//! results that flow through the ingestion and answering pipeline.

use anyhow::{bail, Result};

/// Text-bearing record produced by the extractor before chunking.
///
/// One file yields zero or more records: one per page for paginated
/// formats (PDF), one per file otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub content: String,
    pub source_path: String,
    /// 0-based page number for paginated formats.
    pub page: Option<u32>,
}

/// A bounded-length segment of extracted text, the unit stored in an index.
///
/// Metadata is inherited from the source [`DocumentRecord`]; `chunk_index`
/// is the chunk's sequential position across the file's whole chunk output.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub source_path: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
}

/// A chunk as persisted in an index, with its row identity.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub source_path: String,
    pub page: Option<i64>,
    pub chunk_index: i64,
    pub content: String,
}

/// A retrieved chunk paired with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// Outcome of one ingestion, returned to the boundary layer.
///
/// `indexed` is false when extraction or indexing degraded; the upload
/// itself still succeeded.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub owner: String,
    pub filename: String,
    pub content_hash: String,
    pub records: usize,
    pub chunks: usize,
    pub indexed: bool,
}

/// Validate an owner identifier before any filesystem path is derived
/// from it. Owners are stable strings supplied by the boundary layer.
pub fn validate_owner_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("owner id must not be empty");
    }
    if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        bail!("owner id must not contain path separators: {:?}", id);
    }
    Ok(())
}

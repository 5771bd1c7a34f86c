//! Boundary-aware overlapping text chunker.
//!
//! Splits extracted [`DocumentRecord`]s into [`Chunk`]s of a target
//! character size with a fixed overlap between consecutive chunks. Near
//! the target size the splitter prefers a paragraph break, then a line
//! break, then a sentence end, then plain whitespace, over a hard cut.
//!
//! Chunking is deterministic: the same records always yield the same
//! chunk sequence.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, DocumentRecord};

/// How far back from the target size the splitter searches for a natural
/// boundary, as a fraction of the chunk size.
const BREAK_WINDOW_DIVISOR: usize = 5;

/// Split records into chunks, assigning `chunk_index` sequentially across
/// the whole output so each chunk of a file has a unique position.
pub fn split_records(records: &[DocumentRecord], chunking: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;

    for record in records {
        for piece in split_text(&record.content, chunking.chunk_size, chunking.overlap) {
            chunks.push(Chunk {
                content: piece,
                source_path: record.source_path.clone(),
                page: record.page,
                chunk_index,
            });
            chunk_index += 1;
        }
    }

    chunks
}

/// Split one text into overlapping pieces of at most `chunk_size`
/// characters. Pieces are trimmed; empty pieces are dropped.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = start + chunk_size;
        let end = if hard_end >= chars.len() {
            chars.len()
        } else {
            let floor = hard_end.saturating_sub(chunk_size / BREAK_WINDOW_DIVISOR).max(start + 1);
            find_break(&chars, floor, hard_end)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }
        // Step back by the overlap, but always make forward progress.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    pieces
}

/// Find the best break position in `(floor, ceiling]`, scanning backwards.
/// Returns `ceiling` (a hard cut) when no natural boundary exists.
fn find_break(chars: &[char], floor: usize, ceiling: usize) -> usize {
    // Paragraph break.
    for i in (floor..ceiling).rev() {
        if chars[i] == '\n' && i > 0 && chars[i - 1] == '\n' {
            return i + 1;
        }
    }
    // Line break.
    for i in (floor..ceiling).rev() {
        if chars[i] == '\n' {
            return i + 1;
        }
    }
    // Sentence end followed by whitespace.
    for i in (floor..ceiling).rev() {
        if matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(false)
        {
            return i + 1;
        }
    }
    // Any whitespace.
    for i in (floor..ceiling).rev() {
        if chars[i] == ' ' {
            return i + 1;
        }
    }
    ceiling
}

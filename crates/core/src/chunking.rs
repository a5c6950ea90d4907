use crate::models::Chunk;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Overlap actually used: never reaches the window size, so every stride advances.
    pub fn effective_overlap(&self) -> usize {
        let size = self.chunk_size.max(1);
        if self.overlap >= size {
            size - 1
        } else {
            self.overlap
        }
    }
}

/// Sliding-window split. Window `k` starts at `k * (chunk_size - overlap)`; the
/// last window is cut at the end of the text, so every character is covered.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    let size = config.chunk_size.max(1);
    let overlap = config.effective_overlap();
    if overlap != config.overlap {
        warn!(
            chunk_size = size,
            requested_overlap = config.overlap,
            overlap,
            "overlap must be smaller than chunk_size; clamping"
        );
    }

    let chars: Vec<char> = text.chars().collect();
    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    info!(
        chunk_count = chunks.len(),
        chunk_size = size,
        overlap,
        "chunked text"
    );
    chunks
}

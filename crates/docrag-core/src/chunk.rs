//! Fixed-size overlapping text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! where each chunk after the first starts `chunk_size - chunk_overlap`
//! characters after its predecessor. Sizes and offsets are counted in
//! Unicode scalar values, so a chunk boundary never splits a character.
//!
//! Each chunk carries its start offset, the number of characters it shares
//! with the previous chunk, and a SHA-256 hash of its text.
//!
//! # Algorithm
//!
//! 1. Start at character 0.
//! 2. Emit the next `chunk_size` characters (or the remainder).
//! 3. Stop once a chunk reaches the end of the text.
//! 4. Otherwise advance the start by `chunk_size - chunk_overlap`.
//!
//! The chunk sequence covers the whole input with no gaps, and dropping
//! each chunk's overlap prefix before concatenating reconstructs the input
//! exactly (see [`reassemble`]).
//!
//! # Example
//!
//! ```rust
//! use docrag_core::chunk::{ChunkConfig, Chunker};
//!
//! let chunker = Chunker::new(ChunkConfig::new(10, 2).unwrap());
//! let chunks: Vec<_> = chunker.chunks("fox.txt", "The quick brown fox").collect();
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[1].start_offset, 8);
//! assert_eq!(chunks[1].overlap, 2);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, RagResult};
use crate::models::Chunk;

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkConfig {
    /// Validate and build a chunking configuration.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidConfiguration`] when `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Distance in characters between consecutive chunk starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Splits text according to a [`ChunkConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Lazily iterate over the chunks of `text`.
    ///
    /// The iterator is `Clone`; cloning it (or calling `chunks` again)
    /// restarts the sequence from the same position.
    pub fn chunks<'a>(&self, document_key: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks {
            document_key,
            text,
            config: self.config,
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: false,
        }
    }

    /// Collect all chunks of `text`.
    pub fn split(&self, document_key: &str, text: &str) -> Vec<Chunk> {
        self.chunks(document_key, text).collect()
    }
}

/// Iterator returned by [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document_key: &'a str,
    text: &'a str,
    config: ChunkConfig,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done || self.byte_pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.byte_pos..];
        let end = byte_offset_of_char(rest, self.config.chunk_size);
        let overlap = if self.index == 0 {
            0
        } else {
            self.config.chunk_overlap
        };

        let chunk = make_chunk(
            self.document_key,
            self.index,
            self.char_pos,
            overlap,
            &rest[..end],
        );

        if end == rest.len() {
            self.done = true;
        } else {
            self.byte_pos += byte_offset_of_char(rest, self.config.step());
            self.char_pos += self.config.step();
        }
        self.index += 1;

        Some(chunk)
    }
}

/// Byte offset of the `n`-th character of `s`, or `s.len()` past the end.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Rebuild the original text from an ordered chunk sequence.
///
/// Drops each chunk's `overlap` prefix and concatenates the remainder.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        let skip = byte_offset_of_char(&chunk.text, chunk.overlap);
        out.push_str(&chunk.text[skip..]);
    }
    out
}

/// Create a single [`Chunk`] with a SHA-256 content hash.
fn make_chunk(
    document_key: &str,
    index: usize,
    start_offset: usize,
    overlap: usize,
    text: &str,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_key: document_key.to_string(),
        chunk_index: index,
        start_offset,
        overlap,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOX: &str = "The quick brown fox jumps over the lazy dog.";

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkConfig::new(size, overlap).unwrap())
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            ChunkConfig::new(0, 0),
            Err(RagError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ChunkConfig::new(10, 10),
            Err(RagError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ChunkConfig::new(10, 12),
            Err(RagError::InvalidConfiguration(_))
        ));
        assert!(ChunkConfig::new(1, 0).is_ok());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunker(10, 2).split("doc", "").is_empty());
    }

    #[test]
    fn test_fox_sentence() {
        let chunks = chunker(10, 2).split("fox.txt", FOX);
        assert_eq!(chunks.len(), 6);
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
        assert_eq!(starts, vec![0, 8, 16, 24, 32, 40]);
        assert_eq!(chunks[1].text, "k brown fo");
        assert_eq!(chunks[5].text, "dog.");

        for c in &chunks {
            assert!(c.text.chars().count() <= 10);
            assert_eq!(c.document_key, "fox.txt");
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            assert_eq!(&prev[prev.len() - 2..], &next[..2]);
            assert_eq!(pair[1].overlap, 2);
        }
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn test_reassemble_roundtrip() {
        let texts = [
            FOX.to_string(),
            "a".to_string(),
            "exactly ten".to_string(),
            "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘".to_string(),
            "日本語のテキストを分割します。".repeat(7),
            (0..50).map(|i| format!("line {}\n", i)).collect(),
        ];
        let configs = [(1, 0), (3, 1), (10, 2), (10, 9), (64, 0), (7, 3)];
        for text in &texts {
            for (size, overlap) in configs {
                let chunks = chunker(size, overlap).split("doc", text);
                assert_eq!(
                    &reassemble(&chunks),
                    text,
                    "roundtrip failed for size={} overlap={}",
                    size,
                    overlap
                );
            }
        }
    }

    #[test]
    fn test_text_shorter_than_chunk() {
        let chunks = chunker(100, 10).split("doc", "short");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_fragment() {
        // 8 chars, size 4, no overlap → exactly two chunks
        let chunks = chunker(4, 0).split("doc", "abcdefgh");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_restartable() {
        let chunker = chunker(5, 1);
        let iter = chunker.chunks("doc", FOX);
        let first: Vec<Chunk> = iter.clone().collect();
        let second: Vec<Chunk> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first, chunker.split("doc", FOX));
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let chunks = chunker(3, 1).split("doc", "héllo wörld");
        assert_eq!(chunks[0].text, "hél");
        assert_eq!(chunks[1].start_offset, 2);
        assert_eq!(chunks[1].text, "llo");
    }

    #[test]
    fn test_indices_contiguous_and_hashes_stable() {
        let a = chunker(6, 2).split("doc", FOX);
        let b = chunker(6, 2).split("doc", FOX);
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x.chunk_index, i);
            assert_eq!(x.hash, y.hash);
        }
    }
}

//! Sliding-window text chunker.
//!
//! Splits the text of one page into fixed-size, overlapping windows.
//! Sizes are measured in characters (Unicode scalar values), so a window
//! never ends inside a multi-byte character.
//!
//! Each chunk carries a SHA-256 hash of its exact text. The hash does not
//! depend on neighbouring chunks, the page, or the document, so identical
//! content always hashes identically.
//!
//! # Algorithm
//!
//! 1. If the text has at most `chunk_size` characters, emit it whole as
//!    index 0 (even when empty).
//! 2. Otherwise emit `[start, start + chunk_size)` and advance `start` by
//!    `chunk_size - overlap`, or by 1 when `overlap >= chunk_size`.
//! 3. Stop after emitting the window whose end reaches the text length.
//!
//! # Example
//!
//! ```rust
//! use nexus_core::chunk::{chunk_text, ChunkParams};
//!
//! let params = ChunkParams { chunk_size: 800, overlap: 80 };
//! let text = "x".repeat(1000);
//! let chunks = chunk_text(&text, 1, &params);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].content.chars().count(), 280);
//! ```

use sha2::{Digest, Sha256};

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    /// Distance between consecutive window starts. Always at least 1.
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// One window of page text. `chunk_index` is local to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub page: u32,
    pub chunk_index: usize,
    pub content: String,
    pub content_hash: String,
}

/// Split a page's text into overlapping windows.
pub fn chunk_text(text: &str, page: u32, params: &ChunkParams) -> Vec<TextChunk> {
    let chunk_size = params.chunk_size.max(1);

    // Byte offset of every character, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = offsets.len() - 1;

    if char_len <= chunk_size {
        return vec![make_chunk(page, 0, text)];
    }

    let step = params.step();
    let mut chunks = Vec::with_capacity(char_len / step + 1);
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(char_len);
        let index = chunks.len();
        chunks.push(make_chunk(page, index, &text[offsets[start]..offsets[end]]));
        if end >= char_len {
            break;
        }
        start += step;
    }

    chunks
}

/// Hex SHA-256 of a piece of text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(page: u32, index: usize, text: &str) -> TextChunk {
    TextChunk {
        page,
        chunk_index: index,
        content: text.to_string(),
        content_hash: content_hash(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: ChunkParams = ChunkParams {
        chunk_size: 800,
        overlap: 80,
    };

    #[test]
    fn test_short_text_single_chunk() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 1, &DEFAULT);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].page, 1);
    }

    #[test]
    fn test_empty_text_single_chunk() {
        let chunks = chunk_text("", 3, &DEFAULT);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, "");
        assert_eq!(chunks[0].content_hash, content_hash(""));
    }

    #[test]
    fn test_exact_chunk_size_is_single_chunk() {
        let text = "b".repeat(800);
        assert_eq!(chunk_text(&text, 1, &DEFAULT).len(), 1);
    }

    #[test]
    fn test_thousand_chars_two_windows() {
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, 1, &DEFAULT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.len(), 800);
        assert_eq!(chunks[0].content, text[..800]);
        assert_eq!(chunks[1].content, text[720..1000]);
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let params = ChunkParams {
            chunk_size: 37,
            overlap: 5,
        };
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let chunks = chunk_text(&text, 1, &params);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= params.chunk_size);
        }
        // Last window reaches the end of the text.
        assert!(text.ends_with(&chunks.last().unwrap().content));
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_progresses() {
        let params = ChunkParams {
            chunk_size: 10,
            overlap: 25,
        };
        let text = "z".repeat(50);
        let chunks = chunk_text(&text, 1, &params);
        // Advance by one character per window: starts 0..=40.
        assert_eq!(chunks.len(), 41);
        assert!(chunks.len() <= text.len());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn test_overlap_equal_to_size_is_bounded() {
        let params = ChunkParams {
            chunk_size: 4,
            overlap: 4,
        };
        let chunks = chunk_text("abcdefgh", 1, &params);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "bcde", "cdef", "defg", "efgh"]);
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let params = ChunkParams {
            chunk_size: 3,
            overlap: 1,
        };
        let text = "häßlich€ü";
        let chunks = chunk_text(text, 1, &params);
        for c in &chunks {
            assert!(c.content.chars().count() <= 3);
        }
        assert_eq!(chunks[0].content, "häß");
        assert_eq!(chunks[1].content, "ßli");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta. ".repeat(100);
        let c1 = chunk_text(&text, 2, &DEFAULT);
        let c2 = chunk_text(&text, 2, &DEFAULT);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_hash_depends_only_on_content() {
        let a = chunk_text("same words", 1, &DEFAULT);
        let b = chunk_text("same words", 9, &DEFAULT);
        assert_eq!(a[0].content_hash, b[0].content_hash);
        assert_ne!(a[0].content_hash, content_hash("other words"));
        assert_eq!(a[0].content_hash.len(), 64);
    }
}

//! Splitting extracted document text into fragments.

use crate::config::ChunkingConfig;

/// Turns a document's text into an ordered sequence of non-empty fragments.
pub trait Chunker: Send + Sync {
    /// Split `text` into fragments.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Fixed-size character windows with overlap.
///
/// Windows start every `chunk_size - chunk_overlap` characters. Windows that
/// are only whitespace are dropped.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedWindowChunker {
    /// Create a chunker. An overlap not smaller than the window is reduced
    /// so every step advances by at least one character.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Default for FixedWindowChunker {
    fn default() -> Self {
        Self::from(ChunkingConfig::default())
    }
}

impl From<ChunkingConfig> for FixedWindowChunker {
    fn from(config: ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            if !window.trim().is_empty() {
                chunks.push(window);
            }
            start += self.step();
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_windows_overlap() {
        let chunker = FixedWindowChunker::new(4, 1);
        assert_eq!(chunker.chunk("abcdefghij"), vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = FixedWindowChunker::default();
        assert_eq!(chunker.chunk("hello"), vec!["hello"]);
    }

    #[test]
    fn test_whitespace_windows_dropped() {
        let chunker = FixedWindowChunker::new(3, 0);
        assert_eq!(chunker.chunk("ab      cd"), vec!["ab ", "  c", "d"]);
        assert!(chunker.chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = FixedWindowChunker::new(2, 0);
        assert_eq!(chunker.chunk("日本語"), vec!["日本", "語"]);
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = FixedWindowChunker::new(2, 5);
        assert_eq!(chunker.chunk("abc"), vec!["ab", "bc", "c"]);
    }
}

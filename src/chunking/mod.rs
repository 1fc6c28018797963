//! Sentence-aware, citation-safe text chunking.
//!
//! The [`Chunker`] splits raw document text into overlapping, size-bounded
//! chunks without breaking words. Paragraphs are the primary unit: they are
//! merged into a running buffer until the size limit is reached, at which
//! point the buffer is flushed and the next buffer is seeded with an overlap
//! tail from the end of the previous chunk. Oversized paragraphs fall back
//! to sentence-level splitting, and a single oversized unit is hard-split at
//! the last whitespace inside the limit.
//!
//! All sizes are measured in characters, not bytes, so multi-byte text never
//! panics on a split boundary.

use crate::error::ChunkingError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

/// Blank-line paragraph separator (one or more empty lines, possibly with
/// whitespace between the newlines).
static PARAGRAPH_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\n\s*\n").expect("paragraph boundary regex is valid")
});

/// Splits text into clean, overlapping chunks without breaking words or
/// sentences.
///
/// Designed for citation-based retrieval: every emitted chunk starts and
/// ends at a word boundary and is stripped of surrounding whitespace, so a
/// chunk can be quoted verbatim in an answer.
///
/// # Example
///
/// ```
/// use lorebook::chunking::Chunker;
///
/// let chunker = Chunker::new(1000, 200).unwrap();
/// let chunks = chunker.chunk("A short document.");
/// assert_eq!(chunks, vec!["A short document.".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Creates a chunker with the given size bound and overlap, both in
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] if `chunk_overlap` is not
    /// strictly smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap carried between consecutive chunks, in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into ordered chunks.
    ///
    /// Empty or whitespace-only input yields an empty vector. Any input no
    /// longer than `chunk_size` yields exactly one chunk: the trimmed input.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let paragraphs = split_paragraphs(text);
        self.merge_paragraphs(&paragraphs)
    }

    /// Merges paragraphs into size-bounded chunks, falling back to sentence
    /// splitting for paragraphs that exceed the limit on their own.
    fn merge_paragraphs(&self, paragraphs: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs {
            if char_len(paragraph) > self.chunk_size {
                for sentence in split_sentences(paragraph) {
                    current = self.append_with_limit(current, &sentence, &mut chunks);
                }
                continue;
            }

            current = self.append_with_limit(current, paragraph, &mut chunks);
        }

        let tail = current.trim();
        if !tail.is_empty() {
            chunks.push(tail.to_string());
        }

        chunks
    }

    /// Appends `addition` to the running buffer, flushing the buffer as a
    /// chunk when the size limit would be exceeded and seeding the next
    /// buffer with an overlap tail.
    fn append_with_limit(
        &self,
        current: String,
        addition: &str,
        chunks: &mut Vec<String>,
    ) -> String {
        let candidate = if current.is_empty() {
            addition.to_string()
        } else {
            format!("{current} {addition}")
        };

        if char_len(&candidate) <= self.chunk_size {
            return candidate;
        }

        if !current.is_empty() {
            chunks.push(current.trim().to_string());
        }

        let overlap = self.overlap_tail(&current);
        let next = if overlap.is_empty() {
            addition.to_string()
        } else {
            format!("{overlap} {addition}")
        };

        // A single unit can still exceed the limit (unbroken long text):
        // hard-split at the last whitespace inside the limit, or at exactly
        // chunk_size characters when no whitespace exists.
        if char_len(&next) > self.chunk_size {
            let limit = byte_index_at_char(&next, self.chunk_size);
            let split = next[..limit].rfind(char::is_whitespace).unwrap_or(limit);
            chunks.push(next[..split].trim().to_string());
            return next[split..].trim().to_string();
        }

        next
    }

    /// Returns up to `chunk_overlap` characters from the end of `text`,
    /// extended forward to the next whitespace so no word is cut.
    fn overlap_tail(&self, text: &str) -> String {
        if text.is_empty() || self.chunk_overlap == 0 {
            return String::new();
        }

        let len = char_len(text);
        if len <= self.chunk_overlap {
            return text.to_string();
        }

        let start = byte_index_at_char(text, len - self.chunk_overlap);
        match text[start..].find(char::is_whitespace) {
            Some(offset) => text[start + offset..].trim_start().to_string(),
            None => text[start..].to_string(),
        }
    }
}

/// Splits text at blank-line boundaries, dropping empty paragraphs.
fn split_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_BOUNDARY
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Splits a paragraph into sentences.
///
/// A sentence boundary is `.`, `!`, or `?` followed by whitespace and an
/// uppercase letter. The lookaround needed to express this is not available
/// in the `regex` crate, so the scan is done by hand.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_uppercase() {
                let end = chars
                    .get(i + 1)
                    .map(|(byte, _)| *byte)
                    .unwrap_or(paragraph.len());
                let sentence = paragraph[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Character count of a string (not byte length).
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `n`-th character, clamped to the end of the string.
fn byte_index_at_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(size, overlap).unwrap()
    }

    /// Builds a paragraph of exactly `len` characters from whole words.
    fn paragraph_of_len(len: usize) -> String {
        let mut out = String::new();
        let words = ["veritas", "lumen", "codex", "umbra", "arcanum"];
        let mut i = 0;
        while out.len() < len {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(words[i % words.len()]);
            i += 1;
        }
        // Trim back to a word boundary at or before `len`, then pad the last
        // word with extra letters to hit the exact length.
        while out.len() > len {
            match out.rfind(' ') {
                Some(pos) => out.truncate(pos),
                None => out.truncate(len),
            }
        }
        while out.len() < len {
            out.push('x');
        }
        out
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(
            Chunker::new(100, 100),
            Err(ChunkingError::InvalidConfig { .. })
        ));
        assert!(matches!(
            Chunker::new(100, 200),
            Err(ChunkingError::InvalidConfig { .. })
        ));
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let c = chunker(100, 20);
        assert!(c.chunk("").is_empty());
        assert!(c.chunk("   \n\t  \n").is_empty());
    }

    #[test]
    fn test_short_text_is_a_single_trimmed_chunk() {
        let c = chunker(100, 20);
        let chunks = c.chunk("  A short document.  ");
        assert_eq!(chunks, vec!["A short document.".to_string()]);
    }

    #[test]
    fn test_text_at_exact_limit_is_one_chunk() {
        let c = chunker(50, 10);
        let text = paragraph_of_len(50);
        assert_eq!(c.chunk(&text), vec![text]);
    }

    #[test]
    fn test_paragraphs_merge_until_limit() {
        let c = chunker(100, 20);
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = c.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "First paragraph here. Second paragraph here.");
    }

    #[test]
    fn test_flush_seeds_next_chunk_with_overlap_tail() {
        let c = chunker(60, 20);
        let first = paragraph_of_len(50);
        let second = paragraph_of_len(40);
        let text = format!("{first}\n\n{second}");
        let chunks = c.chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], first);
        // The second chunk starts with a tail (at most 20 chars, word-safe)
        // of the first chunk.
        let overlap_len = (1..=20)
            .rev()
            .find(|&n| chunks[1].is_char_boundary(n) && chunks[0].ends_with(&chunks[1][..n]));
        assert!(overlap_len.is_some(), "expected an overlap tail");
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let c = chunker(80, 10);
        let text = "The first sentence is right here. Another sentence follows it. \
                    The third sentence closes the paragraph out completely.";
        let chunks = c.chunk(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 80);
        }
        assert!(chunks[0].starts_with("The first sentence"));
    }

    #[test]
    fn test_unbroken_text_hard_splits_at_limit() {
        let c = chunker(50, 10);
        let text = "a".repeat(120);
        let chunks = c.chunk(&text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].len(), 50);
    }

    #[test]
    fn test_no_chunk_exceeds_size_after_overlap() {
        let c = chunker(100, 30);
        let text = [
            paragraph_of_len(90),
            paragraph_of_len(90),
            paragraph_of_len(90),
        ]
        .join("\n\n");
        for chunk in c.chunk(&text) {
            assert!(
                chunk.chars().count() <= 100,
                "chunk of {} chars exceeds limit",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn test_chunks_never_start_mid_word() {
        let c = chunker(100, 30);
        let text = [
            paragraph_of_len(90),
            paragraph_of_len(90),
            paragraph_of_len(90),
        ]
        .join("\n\n");
        let words: std::collections::HashSet<&str> = text.split_whitespace().collect();
        for chunk in c.chunk(&text) {
            let first = chunk.split_whitespace().next().unwrap();
            assert!(
                words.contains(first),
                "chunk starts mid-word: {first:?}"
            );
        }
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let c = chunker(40, 10);
        let text = "Ärger über Äpfel und Öl. ".repeat(20);
        let chunks = c.chunk(&text);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn test_sentence_split_requires_uppercase_follow() {
        let sentences = split_sentences("Version 1.2 is stable. It shipped today.");
        // "1.2 " is not a boundary: the period is followed by a digit.
        assert_eq!(
            sentences,
            vec![
                "Version 1.2 is stable.".to_string(),
                "It shipped today.".to_string(),
            ]
        );
    }

    #[test]
    fn test_sentence_split_handles_exclamation_and_question() {
        let sentences = split_sentences("Really! Are you sure? Yes.");
        assert_eq!(sentences.len(), 3);
    }
}

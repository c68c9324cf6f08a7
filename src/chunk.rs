//! Overlapping fixed-window text chunker.
//!
//! Splits text into windows of at most `chunk_size` characters, with
//! consecutive windows sharing up to `overlap` characters. A window that
//! would end in the middle of a word is pulled back to the last space
//! inside it.
//!
//! # Algorithm
//!
//! 1. Take `chunk_size` characters starting at `start`.
//! 2. If the character right after the window exists and is not
//!    whitespace, end the window at the last `' '` inside it (if any).
//! 3. Trim the window and keep it when non-empty.
//! 4. Stop once the window reaches the end of the text; otherwise continue
//!    from `end - overlap` (or `end`, if that would not move forward).
//!
//! Lengths and offsets count Unicode scalar values, not bytes.
//!
//! ```rust
//! use rag_server::chunk::chunk_text;
//!
//! let chunks = chunk_text("alpha beta gamma delta", 12, 4).unwrap();
//! assert_eq!(chunks[0].text, "alpha beta");
//! assert_eq!(chunks[0].index, 0);
//! ```

use crate::error::RagError;

/// A trimmed window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// Split `text` into overlapping, word-boundary-respecting chunks.
///
/// Returns an empty vector for empty or whitespace-only input. Indices are
/// contiguous from 0.
///
/// # Errors
///
/// [`RagError::Validation`] when `chunk_size == 0` or `overlap >= chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>, RagError> {
    if chunk_size == 0 {
        return Err(RagError::validation("chunk_size must be greater than 0"));
    }
    if overlap >= chunk_size {
        return Err(RagError::validation(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len && !chars[end].is_whitespace() {
            if let Some(pos) = chars[start..end].iter().rposition(|c| *c == ' ') {
                if pos > 0 {
                    end = start + pos;
                }
            }
        }

        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: trimmed.to_string(),
            });
        }

        if end >= len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 5000, 800).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
        assert!(chunk_text("   \n\t  ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            chunk_text("text", 0, 0),
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            chunk_text("text", 10, 10),
            Err(RagError::Validation(_))
        ));
        assert!(matches!(
            chunk_text("text", 10, 25),
            Err(RagError::Validation(_))
        ));
    }

    #[test]
    fn twelve_thousand_chars_make_three_chunks() {
        let text = "abcd ".repeat(2400);
        assert_eq!(text.chars().count(), 12_000);

        let chunks = chunk_text(&text, 5000, 800).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert!(c.text.chars().count() <= 5000);
        }
    }

    #[test]
    fn does_not_split_words() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_text(text, 12, 0).unwrap();
        assert_eq!(chunks[0].text, "one two");
        let words: Vec<&str> = text.split(' ').collect();
        for c in &chunks {
            for piece in c.text.split(' ') {
                assert!(words.contains(&piece), "split word: {:?}", piece);
            }
        }
    }

    #[test]
    fn hard_splits_text_without_spaces() {
        let text = "x".repeat(25);
        let chunks = chunk_text(&text, 10, 2).unwrap();
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![10, 10, 9]);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "x".repeat(30);
        let chunks = chunk_text(&text, 10, 4).unwrap();
        // windows start at 0, 6, 12, 18, 24
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[4].text.len(), 6);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "┌──┐ │héllo wörld│ └──┘ ".repeat(20);
        let chunks = chunk_text(&text, 7, 2).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() <= 7);
        }
    }

    #[test]
    fn terminates_with_contiguous_nonempty_chunks_for_many_parameters() {
        let text = "The quick brown fox jumps over the lazy dog.\n\n  Pack my box with five dozen liquor jugs. "
            .repeat(15);
        for chunk_size in [1usize, 2, 3, 7, 16, 64, 257, 5000] {
            for overlap in [0usize, 1, chunk_size / 2, chunk_size.saturating_sub(1)] {
                if overlap >= chunk_size {
                    continue;
                }
                let chunks = chunk_text(&text, chunk_size, overlap).unwrap();
                assert!(!chunks.is_empty());
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.index, i);
                    assert!(!c.text.trim().is_empty());
                    assert!(text.contains(&c.text));
                }
            }
        }
    }

    #[test]
    fn space_shrunk_window_still_advances() {
        // The only space sits right after the first character, so the window
        // shrinks to one char while the overlap is larger than that.
        let text = format!("a {}", "b".repeat(40));
        let chunks = chunk_text(&text, 10, 5).unwrap();
        assert_eq!(chunks[0].text, "a");
        assert!(chunks.len() > 1);
    }
}

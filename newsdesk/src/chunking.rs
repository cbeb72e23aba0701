//! Sentence-aligned splitting of article text into bounded chunks.

use std::ops::Range;

/// Longest chunk handed to the summarization model, in characters
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 3000;

/// Chunks shorter than this after whitespace normalization are not worth summarizing
pub const DEFAULT_MIN_CHUNK_LENGTH: usize = 50;

/// Iterator over the raw byte ranges of successive chunks of `text`.
///
/// The ranges are contiguous and cover the whole input, so concatenating the slices
/// gives back the source text. Each range holds at most `max_chars` characters.
pub struct ChunkSpans<'a> {
    text: &'a str,
    start: usize,
    max_chars: usize,
}

impl<'a> Iterator for ChunkSpans<'a> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.start..];
        let window_end = match rest.char_indices().nth(self.max_chars) {
            Some((offset, _)) => self.start + offset,
            None => self.text.len(),
        };

        let mut end = window_end;
        if window_end < self.text.len() {
            let window = &self.text[self.start..window_end];
            // Punctuation sitting at the very start of the window does not count.
            if let Some(pos) = window.rfind(|c: char| matches!(c, '.' | '!' | '?')) {
                if pos > 0 {
                    end = self.start + pos + 1;
                }
            }
        }

        let span = self.start..end;
        self.start = end;
        Some(span)
    }
}

/// Split `text` into raw chunk ranges of at most `max_chars` characters, cutting right
/// after the last `.`, `!` or `?` of each window when there is one.
pub fn chunk_spans(text: &str, max_chars: usize) -> ChunkSpans<'_> {
    ChunkSpans {
        text,
        start: 0,
        max_chars: max_chars.max(1),
    }
}

/// Trimmed, non-empty chunks of `text` in order.
pub fn chunk_text(text: &str, max_chars: usize) -> impl Iterator<Item = &str> + '_ {
    chunk_spans(text, max_chars)
        .map(move |span| text[span].trim())
        .filter(|chunk| !chunk.is_empty())
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chunks ready for the model: whitespace-normalized, with the too-short ones dropped.
pub fn summarizable_chunks(text: &str, max_chars: usize, min_chars: usize) -> Vec<String> {
    chunk_text(text, max_chars)
        .map(normalize_whitespace)
        .filter(|chunk| chunk.chars().count() >= min_chars)
        .collect()
}

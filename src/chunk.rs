//! Line-aligned text chunker.
//!
//! Splits sanitized log text into segments of at most `max_chars`
//! characters. Every segment except the last ends right after a `\n` when
//! the window contains one, so a single log line is never split across two
//! provider calls unless the line alone is longer than the limit.
//!
//! Concatenating the segments in order always reproduces the input.

use crate::error::{DigestError, DigestResult};

/// Split `text` into line-aligned windows of at most `max_chars` characters.
///
/// The returned iterator is lazy and [`Clone`], so the same split can be
/// walked more than once. Empty input produces no chunks.
///
/// # Errors
///
/// [`DigestError::Validation`] when `max_chars` is zero.
pub fn chunk_text(text: &str, max_chars: usize) -> DigestResult<Chunks<'_>> {
    if max_chars == 0 {
        return Err(DigestError::validation("max chunk size must be > 0"));
    }
    Ok(Chunks {
        text,
        pos: 0,
        max_chars,
    })
}

/// Iterator over the chunks of one text. See [`chunk_text`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    pos: usize,
    max_chars: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        // Byte offset just past `max_chars` characters, or None for the final window.
        let end = match rest.char_indices().nth(self.max_chars) {
            Some((hard_end, _)) => match rest[..hard_end].rfind('\n') {
                Some(nl) if nl > 0 => nl + 1,
                _ => hard_end,
            },
            None => rest.len(),
        };

        self.pos += end;
        Some(&rest[..end])
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

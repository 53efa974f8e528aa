//! Paragraph-boundary passage splitter.
//!
//! Splits parsed text into [`Passage`]s for the vector index. Paragraphs
//! (separated by a blank line) are packed greedily into passages of at most
//! `max_tokens × 4` bytes; a paragraph larger than that is hard-split at the
//! last newline or space before the limit.
//!
//! Passage ids are derived from the document name and position, so
//! re-chunking unchanged text produces the same ids and an upsert replaces
//! rather than duplicates.
//!
//! ```rust
//! use docsearch_core::chunk::split_passages;
//! use docsearch_core::DocumentName;
//!
//! let doc = DocumentName::new("notes.md").unwrap();
//! let passages = split_passages(&doc, "Hello world.\n\nSecond paragraph.", 700);
//! assert_eq!(passages.len(), 1);
//! assert_eq!(passages[0].id, "notes.md#0");
//! ```

use crate::models::{DocumentName, Passage};

/// Rough characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into passages of at most `max_tokens` (approximate).
///
/// Whitespace-only text yields no passages. Indices are contiguous from 0.
pub fn split_passages(document: &DocumentName, text: &str, max_tokens: usize) -> Vec<Passage> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Passage {
            id: Passage::id_for(document, index),
            document: document.clone(),
            index,
            text,
        })
        .collect()
}

/// Cut an oversized paragraph at newline/space boundaries, never inside a
/// UTF-8 sequence.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;
    while !remaining.is_empty() {
        let mut cut = floor_char_boundary(remaining, max_chars);
        if cut < remaining.len() {
            if let Some(pos) = remaining[..cut].rfind(['\n', ' ']) {
                if pos > 0 {
                    cut = pos + 1;
                }
            }
        }
        if cut == 0 {
            // Limit smaller than the first character: take that character.
            cut = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }
    out
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

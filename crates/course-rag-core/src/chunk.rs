//! Sentence-boundary text chunker.
//!
//! Splits lesson text into overlapping windows that respect a configurable
//! `chunk_size`. Windows are assembled from whole sentences so a chunk
//! never starts or ends mid-sentence unless a single sentence is longer
//! than the window itself.
//!
//! # Algorithm
//!
//! 1. Collapse whitespace and split the text into sentences at `.`, `!`
//!    or `?` followed by a space and a non-lowercase character. Common
//!    abbreviations (`Dr.`, `e.g.`) and single-letter initials do not end
//!    a sentence.
//! 2. Append sentences to the current window until the next one would
//!    push it past `chunk_size`.
//! 3. Flush the window as a chunk and seed the next window with the
//!    trailing sentences whose combined length fits in `chunk_overlap`.
//! 4. A sentence longer than the window is hard-split at the nearest
//!    space boundary.
//!
//! The first window can be shrunk by `first_reserve` bytes so a caller can
//! prefix the first chunk with a header without breaking the size bound.
//!
//! # Example
//!
//! ```rust
//! use course_rag_core::chunk::chunk_sentences;
//!
//! let chunks = chunk_sentences("One sentence. Another one.", 800, 100, 0);
//! assert_eq!(chunks, vec!["One sentence. Another one.".to_string()]);
//! ```

use std::collections::VecDeque;

/// Words that end with a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "no",
];

/// Split text into sentences.
///
/// Whitespace runs (including newlines) are collapsed to single spaces,
/// so the returned sentences never contain line breaks.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut start = 0;

    for (pos, c) in normalized.char_indices() {
        if c != ' ' {
            continue;
        }
        let before = &normalized[start..pos];
        if ends_sentence(before) && starts_sentence(&normalized[pos + 1..]) {
            let sentence = before.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = pos + 1;
        }
    }

    let tail = normalized[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn ends_sentence(text: &str) -> bool {
    let trimmed = text.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
    let Some(last) = trimmed.chars().last() else {
        return false;
    };
    if !matches!(last, '.' | '!' | '?') {
        return false;
    }
    if last == '.' {
        let word = trimmed
            .rsplit(' ')
            .next()
            .unwrap_or("")
            .trim_end_matches('.')
            .trim_start_matches(['(', '"', '\'']);
        let mut letters = word.chars();
        if let (Some(only), None) = (letters.next(), letters.next()) {
            if only.is_alphabetic() {
                return false;
            }
        }
        if ABBREVIATIONS.contains(&word.to_lowercase().as_str()) {
            return false;
        }
    }
    true
}

fn starts_sentence(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| !c.is_lowercase())
}

/// Split text into sentence-bounded chunks.
///
/// # Arguments
///
/// * `text` — Lesson (or preamble) body.
/// * `chunk_size` — Maximum chunk length in bytes.
/// * `chunk_overlap` — Budget for sentences repeated from the previous chunk.
/// * `first_reserve` — Bytes kept free in the first chunk for a caller-added prefix.
///
/// # Guarantees
///
/// - Empty or whitespace-only text yields no chunks.
/// - Every chunk is at most `chunk_size` bytes (the first at most
///   `chunk_size - first_reserve`), except that a single character wider
///   than the window becomes a chunk on its own.
/// - Every chunk starts at a sentence boundary or at a hard-split point
///   of an oversized sentence.
pub fn chunk_sentences(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    first_reserve: usize,
) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let first_limit = chunk_size.saturating_sub(first_reserve).max(1);

    let mut queue: VecDeque<String> = split_sentences(text).into_iter().collect();
    let mut chunks: Vec<String> = Vec::new();
    let mut window: Vec<String> = Vec::new();
    // Sentences in `window` that were not carried over as overlap.
    let mut fresh = 0usize;

    while let Some(sentence) = queue.pop_front() {
        let limit = if chunks.is_empty() {
            first_limit
        } else {
            chunk_size
        };

        if window.is_empty() && sentence.len() > limit {
            let pieces = hard_split(&sentence, limit);
            if pieces.len() > 1 {
                for piece in pieces.into_iter().rev() {
                    queue.push_front(piece);
                }
                continue;
            }
            // Indivisible: one character wider than the window.
        }

        if !window.is_empty() && joined_len(&window) + 1 + sentence.len() > limit {
            if fresh > 0 {
                chunks.push(window.join(" "));
                window = overlap_tail(&window, chunk_overlap);
            } else {
                window.clear();
            }
            fresh = 0;
            queue.push_front(sentence);
            continue;
        }

        window.push(sentence);
        fresh += 1;
    }

    if fresh > 0 {
        chunks.push(window.join(" "));
    }

    chunks
}

fn joined_len(window: &[String]) -> usize {
    let text: usize = window.iter().map(String::len).sum();
    text + window.len().saturating_sub(1)
}

/// Trailing sentences of `window` that fit in `budget`, never the whole window.
fn overlap_tail(window: &[String], budget: usize) -> Vec<String> {
    let mut taken = 0usize;
    let mut len = 0usize;
    for sentence in window.iter().rev() {
        if taken + 1 >= window.len() {
            break;
        }
        let extra = sentence.len() + usize::from(taken > 0);
        if len + extra > budget {
            break;
        }
        len += extra;
        taken += 1;
    }
    window[window.len() - taken..].to_vec()
}

/// Split an oversized sentence at space boundaries into pieces of at most `limit` bytes.
fn hard_split(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        if remaining.len() <= limit {
            pieces.push(remaining.to_string());
            break;
        }
        let cut = snap_to_char_boundary(remaining, limit);
        let cut = if cut == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };
        let split_at = remaining[..cut]
            .rfind(' ')
            .filter(|&p| p > 0)
            .unwrap_or(cut);
        pieces.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

//! Sentence-bounded overlapping chunker.
//!
//! Splits cleaned text into chunks of at most `max_chunk_size` characters,
//! never cutting mid-sentence when a boundary exists, and carries trailing
//! sentences up to `overlap` characters into the next chunk so consecutive
//! chunks share context. Output is deterministic: the same input always yields
//! the same chunk sequence.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Sentence break candidates: terminal punctuation followed by whitespace, or
/// a newline run. The punctuation stays with the sentence it closes.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+|\n+").expect("valid boundary pattern"));

/// Normalizes whitespace in extracted text: collapses runs of whitespace into
/// single spaces and trims the ends.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RUNS.replace_all(text, " ").trim().to_string()
}

/// Splits `text` into sentences at break candidates. Empty fragments are
/// dropped; a trailing fragment without terminal punctuation is kept.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // For a punctuation boundary the match begins at the terminator, which
        // belongs to the sentence; a newline run belongs to neither side.
        let end = if boundary.as_str().starts_with('\n') {
            boundary.start()
        } else {
            boundary.start() + 1
        };
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Splits text into overlapping chunks for embedding.
///
/// Sentences are accumulated greedily until adding the next one would exceed
/// `max_chunk_size` characters. When a chunk closes, the trailing sentences
/// whose combined length fits in `overlap` seed the next chunk. A single
/// sentence longer than `max_chunk_size` is emitted as its own oversized chunk
/// rather than truncated. Empty or whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&cleaned);

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        // Budgets are in characters, not bytes.
        let sentence_len = sentence.chars().count() + 1;
        if current_len + sentence_len > max_chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));

            // Carry trailing sentences that fit within the overlap budget.
            let mut carried = String::new();
            let mut carried_len = 0usize;
            for prior in current.iter().rev() {
                let prior_len = prior.chars().count();
                if carried_len + prior_len + 1 <= overlap {
                    if carried.is_empty() {
                        carried = prior.clone();
                        carried_len = prior_len;
                    } else {
                        carried = format!("{prior} {carried}");
                        carried_len += prior_len + 1;
                    }
                } else {
                    break;
                }
            }

            current.clear();
            current_len = carried_len;
            if !carried.is_empty() {
                current.push(carried);
            }
        }
        current.push(sentence.to_string());
        current_len += sentence_len;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

//! Word-window chunking with configurable size and overlap.

/// Default window size, in words.
pub const DEFAULT_MAX_WORDS: usize = 220;

/// Default overlap between consecutive windows, in words.
pub const DEFAULT_OVERLAP: usize = 40;

/// Chunk text into overlapping word windows.
///
/// Words are whitespace-delimited. Each window holds up to `max_words` words
/// and the next window starts `max(1, max_words - overlap)` words later, so
/// an overlap equal to or larger than the window size degrades to a one-word
/// step instead of looping. Whitespace-only windows are dropped; empty input
/// yields no chunks.
pub fn chunk_text(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || max_words == 0 {
        return vec![];
    }

    let step = max_words.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + max_words).min(words.len());
        let chunk = words[start..end].join(" ");
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        start += step;
    }

    tracing::debug!(
        "Chunked text into {} chunks (max_words: {}, overlap: {})",
        chunks.len(),
        max_words,
        overlap
    );

    chunks
}

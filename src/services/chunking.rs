//! Transcription chunking for long consultations.
//!
//! Chunks are contiguous slices of the input: concatenating them yields the
//! original text exactly. Each chunk holds at most `max_chars` characters.

/// Splits a transcription into ordered chunks of at most `max_chars` characters.
///
/// Cuts prefer the end of a sentence in the latter half of the window, then
/// the last whitespace, and fall back to a hard cut. A `max_chars` of zero
/// disables chunking. Empty input yields no chunks.
#[must_use]
pub fn chunk_transcription(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some((limit, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..limit];
        let cut = sentence_cut(window)
            .or_else(|| whitespace_cut(window))
            .unwrap_or(limit);
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }

    tracing::debug!(
        chunks = chunks.len(),
        max_chars,
        input_chars = text.chars().count(),
        "Chunked transcription"
    );
    chunks
}

/// Byte offset just past the last sentence terminator (and its trailing
/// whitespace) in the latter half of the window.
fn sentence_cut(window: &str) -> Option<usize> {
    let (pos, terminator) = window
        .char_indices()
        .rev()
        .find(|(_, c)| matches!(c, '.' | '?' | '!' | '\n'))?;
    if pos < window.len() / 2 {
        return None;
    }

    let end = pos + terminator.len_utf8();
    let trailing = window[end..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(window.len() - end, |(i, _)| i);
    Some(end + trailing)
}

/// Byte offset just past the last whitespace in the window.
fn whitespace_cut(window: &str) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&cut| cut > 0)
}

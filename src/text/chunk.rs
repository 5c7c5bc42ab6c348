//! Deterministic paragraph-aware chunker with sentence-boundary fallback
//! and character overlap.

use once_cell::sync::Lazy;
use regex::Regex;

// The `regex` crate has no lookbehind support, so sentence splitting is
// done by hand in `split_sentences` instead of a `(?<=[.!?])\s+` pattern.
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Splits on sentence-ending punctuation followed by whitespace, keeping
/// the punctuation with the preceding sentence.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(paragraph) {
        let split_at = m.start() + 1;
        let piece = paragraph[last..split_at].trim();
        if !piece.is_empty() {
            sentences.push(piece.to_string());
        }
        last = m.end();
    }
    let tail = paragraph[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

pub const DETERMINISTIC_RATIONALE: &str = "Deterministic paragraph-aware boundary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCandidate {
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub text: String,
    pub rationale: String,
}

/// Errors if parameters violate the bounds spec §4.2 names.
pub fn validate_chunk_params(max_chunk_chars: usize, min_chunk_chars: usize, overlap_chars: usize) -> crate::Result<()> {
    if !(500..=8000).contains(&max_chunk_chars) {
        return Err(crate::RagError::Validation(format!(
            "max_chunk_chars must be within 500..=8000, got {max_chunk_chars}"
        )));
    }
    if !(100..=3000).contains(&min_chunk_chars) {
        return Err(crate::RagError::Validation(format!(
            "min_chunk_chars must be within 100..=3000, got {min_chunk_chars}"
        )));
    }
    if overlap_chars > 1000 {
        return Err(crate::RagError::Validation(format!(
            "overlap_chars must be within 0..=1000, got {overlap_chars}"
        )));
    }
    if min_chunk_chars > max_chunk_chars {
        return Err(crate::RagError::Validation(
            "min_chunk_chars must be <= max_chunk_chars".to_string(),
        ));
    }
    Ok(())
}

/// Splits `text` into variable-size chunks on blank-line paragraph
/// boundaries, falling back to sentence splitting then hard-wrapping for
/// oversized paragraphs, with a "heading fusion" budget that keeps short
/// leading fragments attached to their neighbor.
pub fn chunk(text: &str, max_chunk_chars: usize, min_chunk_chars: usize, overlap_chars: usize) -> Vec<ChunkCandidate> {
    let raw_paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    let mut paragraphs: Vec<String> = Vec::new();
    for paragraph in raw_paragraphs {
        paragraphs.extend(split_long_paragraph(paragraph, max_chunk_chars, min_chunk_chars));
    }

    if paragraphs.is_empty() {
        return Vec::new();
    }

    let heading_fusion_budget = max_chunk_chars + 80.max(overlap_chars);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current = paragraph;
            continue;
        }

        let tentative = format!("{current}\n\n{paragraph}");
        if tentative.chars().count() <= max_chunk_chars
            || (current.chars().count() < min_chunk_chars && tentative.chars().count() <= heading_fusion_budget)
        {
            current = tentative;
            continue;
        }

        chunks.push(std::mem::take(&mut current));
        current = paragraph;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut merged_chunks: Vec<String> = Vec::new();
    for chunk_text in chunks {
        let fits_fusion_budget = merged_chunks
            .last()
            .map(|prev| prev.chars().count() + 2 + chunk_text.chars().count() <= heading_fusion_budget)
            .unwrap_or(false);
        if !merged_chunks.is_empty() && chunk_text.chars().count() < min_chunk_chars && fits_fusion_budget {
            let prev = merged_chunks.last_mut().unwrap();
            *prev = format!("{prev}\n\n{chunk_text}").trim().to_string();
        } else {
            merged_chunks.push(chunk_text);
        }
    }

    let text_chars: Vec<char> = text.chars().collect();
    let mut candidates = Vec::with_capacity(merged_chunks.len());
    let mut cursor: usize = 0;
    for (index, chunk_text) in merged_chunks.into_iter().enumerate() {
        let chunk_chars: Vec<char> = chunk_text.chars().collect();
        let start = find_from(&text_chars, &chunk_chars, cursor).unwrap_or(cursor);
        let end = start + chunk_chars.len();

        candidates.push(ChunkCandidate {
            chunk_index: index as i64,
            start_char: start as i64,
            end_char: end as i64,
            text: chunk_text,
            rationale: DETERMINISTIC_RATIONALE.to_string(),
        });

        cursor = if overlap_chars > 0 {
            end.saturating_sub(overlap_chars)
        } else {
            end
        };
    }

    candidates
}

/// Finds `needle` in `haystack` at or after char index `from`, both given
/// as codepoint slices so offsets line up with `ChunkCandidate`'s
/// `start_char`/`end_char` (codepoint, not byte, positions).
fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    let from = from.min(haystack.len());
    if needle.is_empty() {
        return Some(from);
    }
    if needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|i| i + from)
}

fn split_long_paragraph(paragraph: &str, max_chunk_chars: usize, min_chunk_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chunk_chars {
        return vec![paragraph.to_string()];
    }

    let sentences = split_sentences(paragraph);

    if sentences.len() <= 1 {
        return hard_wrap(paragraph, max_chunk_chars);
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = sentences[0].clone();

    for sentence in &sentences[1..] {
        let tentative = format!("{current} {sentence}").trim().to_string();
        if tentative.chars().count() <= max_chunk_chars {
            current = tentative;
            continue;
        }
        pieces.push(std::mem::take(&mut current));
        current = sentence.to_string();
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    let mut normalized_pieces: Vec<String> = Vec::new();
    for piece in pieces {
        if piece.chars().count() <= max_chunk_chars {
            normalized_pieces.push(piece);
        } else {
            normalized_pieces.extend(hard_wrap(&piece, max_chunk_chars));
        }
    }

    let mut merged_pieces: Vec<String> = Vec::new();
    for piece in normalized_pieces {
        if !merged_pieces.is_empty() && piece.chars().count() < min_chunk_chars {
            let prev = merged_pieces.last_mut().unwrap();
            *prev = format!("{prev} {piece}").trim().to_string();
        } else {
            merged_pieces.push(piece);
        }
    }

    merged_pieces
}

fn hard_wrap(text: &str, max_chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut wrapped = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chunk_chars).min(chars.len());
        let segment: String = chars[start..end].iter().collect::<String>().trim().to_string();
        if !segment.is_empty() {
            wrapped.push(segment);
        }
        start += max_chunk_chars;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_paragraphs_split_with_monotonic_offsets() {
        let paragraph = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt ut labore et dolore magna aliqua ut enim ad minim veniam quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur excepteur sint occaecat cupidatat non proident sunt in culpa qui officia deserunt mollit anim id est laborum.";
        let text = vec![paragraph; 4].join("\n\n");

        let chunks = chunk(&text, 900, 200, 0);

        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.text.len() <= 950);
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].end_char <= pair[1].start_char + 1);
            assert!(pair[0].start_char < pair[1].start_char);
        }
    }

    #[test]
    fn contiguous_chunk_indices_from_zero() {
        let text = "Para one.\n\nPara two.\n\nPara three.";
        let chunks = chunk(text, 5000, 100, 0);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn overlap_rewinds_cursor() {
        let text = "First paragraph of reasonable length here.\n\nSecond paragraph of reasonable length here.";
        let chunks = chunk(text, 40, 10, 10);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn offsets_are_codepoint_based_for_multibyte_text() {
        let text = "café résumé naïve\n\n日本語のテキストです。".to_string();
        let chunks = chunk(&text, 5000, 1, 0);
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let slice: String = chars[c.start_char as usize..c.end_char as usize].iter().collect();
            assert_eq!(slice, c.text);
        }
    }

    #[test]
    fn rejects_out_of_range_params() {
        assert!(validate_chunk_params(100, 50, 0).is_err());
        assert!(validate_chunk_params(1000, 2000, 0).is_err());
        assert!(validate_chunk_params(1000, 200, 2000).is_err());
        assert!(validate_chunk_params(1000, 200, 100).is_ok());
    }
}

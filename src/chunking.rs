//! Character-window chunker with sentence-boundary snapping.
//!
//! Splits raw document text into overlapping, size-bounded fragments that
//! define `chunk_index` ordering for a source. The scan works on characters
//! rather than bytes so multi-byte text never splits inside a code point.

/// Characters treated as sentence/paragraph boundaries when snapping a
/// window end backward.
const BOUNDARY_CHARS: [char; 4] = ['.', '!', '?', '\n'];

/// How far back from a window end the boundary search may reach.
const BOUNDARY_LOOKBACK: usize = 100;

/// Splits `text` into trimmed chunks of at most `size` characters, with
/// consecutive chunks overlapping by roughly `overlap` characters.
///
/// When the text fits in a single window the whole (trimmed) text is the
/// only chunk. Otherwise each window end snaps backward to the nearest
/// boundary character within [`BOUNDARY_LOOKBACK`] characters, so chunks
/// prefer to end on sentence or paragraph breaks. Empty chunks are dropped.
///
/// The window start is monotonically non-decreasing and always advances by
/// at least one character, so the scan terminates even when
/// `overlap >= size`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 {
        return Vec::new();
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());

        if end < chars.len() {
            let floor = (start + size).saturating_sub(BOUNDARY_LOOKBACK).max(start);
            for i in (floor + 1..end).rev() {
                if BOUNDARY_CHARS.contains(&chars[i]) {
                    end = i + 1;
                    break;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }

        // Never move backward, always advance by at least one character.
        start = (end.saturating_sub(overlap)).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        let chunks = chunk_text("  hello world  ", 100, 10);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n  ", 100, 10).is_empty());
    }

    #[test]
    fn cuts_at_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(150), "b".repeat(150));
        let chunks = chunk_text(&text, 200, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('.'), "first chunk: {:?}", chunks[0]);
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn falls_back_to_raw_window_without_boundary() {
        let text = "x".repeat(500);
        let chunks = chunk_text(&text, 200, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 200);
        assert_eq!(chunks[1].chars().count(), 200);
        assert_eq!(chunks[2].chars().count(), 100);
    }

    #[test]
    fn no_characters_dropped_without_overlap() {
        let text = "y".repeat(777);
        let chunks = chunk_text(&text, 100, 0);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "z".repeat(400);
        let chunks = chunk_text(&text, 200, 50);
        assert!(chunks.len() >= 2);
        // Second window starts at end - overlap, so it repeats the tail of
        // the first chunk.
        assert_eq!(chunks[1].chars().count(), 200);
    }

    #[test]
    fn terminates_when_overlap_exceeds_size() {
        let text = "w".repeat(300);
        let chunks = chunk_text(&text, 50, 75);
        assert!(!chunks.is_empty());
        // Progress of one character per window caps the chunk count at the
        // text length.
        assert!(chunks.len() <= 300);
    }

    #[test]
    fn multibyte_text_never_splits_code_points() {
        let text = "é".repeat(300);
        let chunks = chunk_text(&text, 128, 16);
        for chunk in &chunks {
            assert!(chunk.chars().all(|c| c == 'é'));
        }
    }

    #[test]
    fn zero_size_yields_no_chunks() {
        assert!(chunk_text("some text", 0, 0).is_empty());
    }
}

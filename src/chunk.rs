//! Paragraph-boundary text chunker with overlap.
//!
//! Splits a document body into pieces that respect a `max_tokens` budget.
//! Splitting prefers paragraph boundaries (`\n\n`) and falls back to a
//! hard split at the nearest newline or space for oversized paragraphs.
//! Each piece after the first is prefixed with the tail of its predecessor
//! so that text straddling a boundary is retrievable from either side.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` and `overlap_tokens` to characters (4 chars/token).
//! 2. Accumulate paragraphs into a buffer sized to leave room for the overlap.
//! 3. Hard-split any paragraph that alone exceeds that size.
//! 4. Prefix piece `i` with the last `overlap` chars of piece `i - 1`,
//!    starting at a word boundary.
//!
//! # Example
//!
//! ```rust
//! use repo_chat::chunk::chunk_text;
//!
//! let pieces = chunk_text("Hello world.\n\nSecond paragraph.", 256, 20);
//! assert_eq!(pieces.len(), 1);
//! ```

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into overlapping pieces of at most `max_tokens` (approximate).
///
/// Whitespace-only text yields no pieces.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);
    // Room for the carried tail and its separating newline.
    let base_chars = if overlap_chars == 0 {
        max_chars
    } else {
        max_chars - overlap_chars - 1
    };

    let pieces = split_pieces(text, base_chars);
    if overlap_chars == 0 {
        return pieces;
    }

    let mut out = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            out.push(piece.clone());
            continue;
        }
        let carried = tail(&pieces[i - 1], overlap_chars);
        if carried.is_empty() {
            out.push(piece.clone());
        } else {
            out.push(format!("{}\n{}", carried, piece));
        }
    }
    out
}

fn split_pieces(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
}

/// Split an oversized paragraph at newline/space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, pieces: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let split_at = if split_at == 0 {
            next_char_boundary(remaining)
        } else {
            split_at
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// The last `max_chars` of `s`, advanced to the start of a word.
fn tail(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut start = s.len() - max_chars;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    let candidate = &s[start..];
    match candidate.find(char::is_whitespace) {
        Some(pos) => candidate[pos..].trim_start(),
        None => candidate,
    }
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

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let pieces = chunk_text("Hello, world!", 256, 20);
        assert_eq!(pieces, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        assert!(chunk_text("", 256, 20).is_empty());
        assert!(chunk_text(" \n\n \t", 256, 20).is_empty());
    }

    #[test]
    fn test_paragraphs_under_limit_merge() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let pieces = chunk_text(text, 256, 0);
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].contains("First paragraph."));
        assert!(pieces[0].contains("Third paragraph."));
    }

    #[test]
    fn test_paragraphs_exceed_limit_split() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let pieces = chunk_text(text, 8, 0);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[1], "This is paragraph two.");
    }

    #[test]
    fn test_pieces_respect_budget() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let pieces = chunk_text(&text, 10, 2);
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.len() <= 40, "piece too long: {} chars", p.len());
        }
    }

    #[test]
    fn test_overlap_carries_tail_of_previous_piece() {
        let text = "alpha beta gamma delta\n\nepsilon zeta eta theta";
        let pieces = chunk_text(text, 8, 2);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], "alpha beta gamma delta");
        assert!(pieces[1].starts_with("delta\n"), "got {:?}", pieces[1]);
        assert!(pieces[1].ends_with("epsilon zeta eta theta"));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let pieces = chunk_text(text, 3, 1);
        assert!(!pieces.is_empty());
        for p in &pieces {
            assert!(!p.is_empty());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 2, 1), chunk_text(text, 2, 1));
    }
}

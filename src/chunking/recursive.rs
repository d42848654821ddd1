//! Span computation for the chunker
//!
//! Works on byte offsets into the source text. Segments are produced lazily:
//! a segment is only split further when it cannot fit into an empty chunk.
//! The first chunk may use the full size; later chunk bodies are limited to
//! `size - overlap` so the overlap prefix never pushes a chunk over the limit.

use std::collections::VecDeque;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Byte layout of one chunk: `overlap_start..start` is the shared prefix,
/// `start..end` is the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub overlap_start: usize,
    pub start: usize,
    pub end: usize,
    /// A single grapheme longer than the size limit
    pub oversized: bool,
}

impl Span {
    fn body(range: Range<usize>, oversized: bool) -> Self {
        Self {
            overlap_start: range.start,
            start: range.start,
            end: range.end,
            oversized,
        }
    }
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Split `segment` on the first separator at or after `level` that occurs in it.
///
/// Separators stay attached to the piece they terminate. Returns `None` once
/// the hierarchy is exhausted.
fn split_on_hierarchy(
    text: &str,
    segment: &Range<usize>,
    level: usize,
    separators: &[String],
) -> Option<Vec<(Range<usize>, usize)>> {
    let slice = &text[segment.clone()];

    for (depth, separator) in separators.iter().enumerate().skip(level) {
        let mut pieces = Vec::new();
        let mut offset = segment.start;
        for piece in slice.split_inclusive(separator.as_str()) {
            pieces.push((offset..offset + piece.len(), depth + 1));
            offset += piece.len();
        }
        if pieces.len() > 1 {
            return Some(pieces);
        }
    }

    None
}

/// Longest grapheme-aligned prefix of `segment` with at most `limit` chars.
///
/// If the first grapheme alone exceeds the limit it is returned whole and
/// flagged as oversized.
fn grapheme_prefix(text: &str, segment: &Range<usize>, limit: usize) -> (usize, bool) {
    let slice = &text[segment.clone()];
    let mut taken_chars = 0;
    let mut end = segment.start;

    for (offset, grapheme) in slice.grapheme_indices(true) {
        let grapheme_chars = grapheme.chars().count();
        if taken_chars + grapheme_chars > limit {
            if taken_chars == 0 {
                return (segment.start + offset + grapheme.len(), true);
            }
            break;
        }
        taken_chars += grapheme_chars;
        end = segment.start + offset + grapheme.len();
    }

    (end, false)
}

/// Greedily pack segments into chunk bodies covering the whole text.
pub fn pack_segments(text: &str, size: usize, overlap: usize, separators: &[String]) -> Vec<Span> {
    let mut queue: VecDeque<(Range<usize>, usize)> = VecDeque::new();
    queue.push_back((0..text.len(), 0));

    let mut spans: Vec<Span> = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut current_chars = 0;

    while let Some((segment, level)) = queue.pop_front() {
        let limit = if spans.is_empty() { size } else { size - overlap };
        let segment_chars = char_len(text, &segment);

        if current_chars + segment_chars <= limit {
            current = Some(match current.take() {
                Some(body) => body.start..segment.end,
                None => segment,
            });
            current_chars += segment_chars;
            continue;
        }

        // Flush what we have and retry the segment against a fresh body
        if let Some(body) = current.take() {
            spans.push(Span::body(body, false));
            current_chars = 0;
            queue.push_front((segment, level));
            continue;
        }

        if let Some(pieces) = split_on_hierarchy(text, &segment, level, separators) {
            for piece in pieces.into_iter().rev() {
                queue.push_front(piece);
            }
            continue;
        }

        let (head_end, oversized) = grapheme_prefix(text, &segment, limit);
        spans.push(Span::body(segment.start..head_end, oversized));
        if head_end < segment.end {
            queue.push_front((head_end..segment.end, separators.len()));
        }
    }

    if let Some(body) = current {
        spans.push(Span::body(body, false));
    }

    spans
}

/// Extend each body backwards by up to `overlap` chars of its predecessor.
///
/// The prefix never reaches past the previous chunk's own start and always
/// begins on a grapheme boundary. Oversized chunks get no prefix.
pub fn assign_overlap(text: &str, mut spans: Vec<Span>, overlap: usize) -> Vec<Span> {
    if overlap == 0 {
        return spans;
    }

    for i in 1..spans.len() {
        if spans[i].oversized {
            continue;
        }

        let previous = spans[i - 1];
        let window = &text[previous.overlap_start..spans[i].start];
        let window_chars = window.chars().count();
        let skip_chars = window_chars.saturating_sub(overlap);

        // Byte offset (within window) of the first char we may share
        let candidate = window
            .char_indices()
            .nth(skip_chars)
            .map(|(byte, _)| byte)
            .unwrap_or(window.len());

        let boundary = window
            .grapheme_indices(true)
            .map(|(byte, _)| byte)
            .find(|&byte| byte >= candidate)
            .unwrap_or(window.len());

        spans[i].overlap_start = previous.overlap_start + boundary;
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_keeps_separators() {
        let text = "a b c";
        let pieces = split_on_hierarchy(text, &(0..text.len()), 0, &seps(&["\n", " "])).unwrap();
        let parts: Vec<_> = pieces.iter().map(|(r, _)| &text[r.clone()]).collect();
        assert_eq!(parts, vec!["a ", "b ", "c"]);
        assert!(pieces.iter().all(|(_, level)| *level == 2));
    }

    #[test]
    fn test_split_exhausted_hierarchy() {
        let text = "abc";
        assert!(split_on_hierarchy(text, &(0..3), 0, &seps(&[" "])).is_none());
        assert!(split_on_hierarchy("a b", &(0..3), 1, &seps(&[" "])).is_none());
    }

    #[test]
    fn test_grapheme_prefix_respects_limit() {
        let text = "héllo";
        let (end, oversized) = grapheme_prefix(text, &(0..text.len()), 3);
        assert_eq!(&text[..end], "hél");
        assert!(!oversized);
    }

    #[test]
    fn test_pack_spans_cover_text() {
        let text = "para one\n\npara two is longer\n\nthree";
        let spans = pack_segments(text, 12, 2, &seps(&["\n\n", " "]));
        assert_eq!(spans.first().map(|s| s.start), Some(0));
        assert_eq!(spans.last().map(|s| s.end), Some(text.len()));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_assign_overlap_bounded_by_previous_chunk() {
        let text = "ab cdefgh";
        let spans = vec![Span::body(0..2, false), Span::body(2..9, false)];
        let spans = assign_overlap(text, spans, 5);
        assert_eq!(spans[1].overlap_start, 0);
    }

    #[test]
    fn test_assign_overlap_skips_oversized() {
        let text = "abcdef";
        let spans = vec![Span::body(0..3, false), Span::body(3..6, true)];
        let spans = assign_overlap(text, spans, 2);
        assert_eq!(spans[1].overlap_start, 3);
    }
}

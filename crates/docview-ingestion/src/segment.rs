//! Segmentation
//!
//! Cuts preprocessed text into stable numbered segments. Blocks come from
//! Markdown structure (paragraphs, headings, fenced code, lists); oversized
//! blocks are further split at sentence boundaries. Segment ids are 1-based
//! and are the referent for every source citation, so segmentation must be
//! deterministic for identical input.

use pulldown_cmark::{Event, Parser};
use std::ops::Range;

use docview_core::Segment;

/// Deterministic segmenter over preprocessed text.
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// Blocks longer than this (in characters) are split at sentence
    /// boundaries.
    max_segment_chars: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            max_segment_chars: 2000,
        }
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_segment_chars(mut self, chars: usize) -> Self {
        self.max_segment_chars = chars;
        self
    }

    /// Split preprocessed text into numbered segments.
    ///
    /// Each segment records its byte range `[start, end)` in the input; the
    /// ranges produced by splitting one oversized block tile that block
    /// without gaps or overlap.
    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for range in top_level_blocks(text) {
            let slice = &text[range.clone()];
            let leading = slice.len() - slice.trim_start().len();
            let trimmed_len = slice.trim_end().len();
            let start = range.start + leading;
            let end = range.start + trimmed_len;
            if start >= end {
                continue;
            }

            let body = &text[start..end];
            if body.chars().count() <= self.max_segment_chars {
                spans.push((start, end));
            } else {
                for (s, e) in split_long_block(body, self.max_segment_chars) {
                    spans.push((start + s, start + e));
                }
            }
        }

        spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| Segment {
                id: i as u32 + 1,
                text: text[start..end].to_string(),
                start,
                end,
            })
            .collect()
    }
}

/// Byte ranges of top-level Markdown blocks, in document order.
fn top_level_blocks(text: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    blocks.push(range);
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    if blocks.is_empty() && !text.trim().is_empty() {
        blocks.push(0..text.len());
    }
    blocks
}

/// Split an oversized block at sentence boundaries.
///
/// Returns byte spans relative to `body` that tile `[0, body.len())`. Each
/// span holds at most `max_chars` characters; the cut is placed at the last
/// sentence boundary inside the window, falling back to a plain character
/// boundary when a window contains none.
fn split_long_block(body: &str, max_chars: usize) -> Vec<(usize, usize)> {
    let char_offsets: Vec<usize> = body.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_offsets.len();
    let boundaries = sentence_boundaries(body);

    let mut spans = Vec::new();
    let mut cursor_char = 0usize;

    while total_chars - cursor_char > max_chars {
        let window_end_char = cursor_char + max_chars;
        let window_end_byte = char_offsets[window_end_char];
        let cursor_byte = char_offsets[cursor_char];

        let cut = boundaries
            .iter()
            .copied()
            .filter(|b| *b > cursor_byte && *b <= window_end_byte)
            .last()
            .unwrap_or(window_end_byte);

        spans.push((cursor_byte, cut));
        cursor_char = char_offsets.partition_point(|&off| off < cut);
    }

    let cursor_byte = char_offsets
        .get(cursor_char)
        .copied()
        .unwrap_or(body.len());
    if cursor_byte < body.len() {
        spans.push((cursor_byte, body.len()));
    }
    spans
}

/// Byte positions directly after sentence-ending punctuation or a newline.
fn sentence_boundaries(body: &str) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let after = i + c.len_utf8();
        match c {
            '\n' => boundaries.push(after),
            '.' | '!' | '?' | '\u{3002}' => {
                let next_is_break = chars
                    .peek()
                    .map(|(_, nc)| nc.is_whitespace())
                    .unwrap_or(true);
                if next_is_break {
                    boundaries.push(after);
                }
            }
            _ => {}
        }
    }
    boundaries
}

//! Sentence segmentation and duration estimates.
//!
//! A boundary is one of `.`, `!` or `?` immediately followed by whitespace.
//! Segments keep their byte range in the source text so the controller can
//! take suffixes of the original string without re-joining anything.

use std::ops::Range;

/// Average milliseconds per word at 1.0x (roughly 150 words per minute).
pub const DEFAULT_MS_PER_WORD: f64 = 400.0;

/// One sentence-like piece of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// The trimmed sentence text.
    pub text: String,
    /// Byte range of `text` within the source.
    pub range: Range<usize>,
    /// Number of whitespace-separated words.
    pub word_count: usize,
    /// Predicted synthesis time at the requested speed.
    pub estimated_duration_ms: f64,
}

/// Splits text into segments using a fixed words-per-minute model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtteranceSegmenter {
    ms_per_word: f64,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self {
            ms_per_word: DEFAULT_MS_PER_WORD,
        }
    }
}

impl UtteranceSegmenter {
    /// A segmenter using `ms_per_word` at 1.0x. Non-positive values use the default.
    pub fn new(ms_per_word: f64) -> Self {
        if ms_per_word.is_finite() && ms_per_word > 0.0 {
            Self { ms_per_word }
        } else {
            Self::default()
        }
    }

    /// Milliseconds per word at 1.0x.
    pub fn ms_per_word(&self) -> f64 {
        self.ms_per_word
    }

    /// Milliseconds per word at `speed`.
    pub fn ms_per_word_at(&self, speed: f64) -> f64 {
        self.ms_per_word / effective_speed(speed)
    }

    /// Split `text` into ordered segments with durations for `speed`.
    pub fn segment(&self, text: &str, speed: f64) -> Vec<Segment> {
        let per_word = self.ms_per_word_at(speed);

        sentence_ranges(text)
            .into_iter()
            .map(|range| {
                let piece = &text[range.clone()];
                let word_count = piece.split_whitespace().count();
                Segment {
                    text: piece.to_string(),
                    range,
                    word_count,
                    estimated_duration_ms: word_count as f64 * per_word,
                }
            })
            .collect()
    }
}

/// Segment with the default words-per-minute model.
pub fn segment(text: &str, speed: f64) -> Vec<Segment> {
    UtteranceSegmenter::default().segment(text, speed)
}

/// A usable speed multiplier: non-finite or non-positive values become `1.0`.
pub fn effective_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

/// Byte ranges of every whitespace-separated word in `text`.
pub fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

fn sentence_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek()
            && next.is_whitespace()
        {
            push_trimmed(text, start..next_idx, &mut ranges);
            start = next_idx;
        }
    }
    push_trimmed(text, start..text.len(), &mut ranges);
    ranges
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let piece = &text[range.clone()];
    let trimmed_start = piece.len() - piece.trim_start().len();
    let trimmed_end = piece.trim_end().len();
    if trimmed_end > trimmed_start {
        out.push(range.start + trimmed_start..range.start + trimmed_end);
    }
}

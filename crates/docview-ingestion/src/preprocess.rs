//! Text preprocessing
//!
//! Pure normalization between extraction and segmentation: line endings,
//! control characters, whitespace runs, repeated page headers/footers, and
//! noise lines. The only failure is empty output, which signals a
//! low-quality document before any LLM call is made.

use std::collections::HashMap;

use crate::{IngestionError, Result};

/// Normalizes raw extracted text into the form segments are cut from.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Lines with fewer meaningful characters are dropped outside code blocks.
    min_line_chars: usize,
    /// A line repeated at least this often is treated as a page header/footer.
    header_min_repeat: usize,
    /// Headers/footers longer than this are never removed.
    header_max_len: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            min_line_chars: 3,
            header_min_repeat: 3,
            header_max_len: 120,
        }
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_line_chars(mut self, chars: usize) -> Self {
        self.min_line_chars = chars;
        self
    }

    pub fn with_header_min_repeat(mut self, repeat: usize) -> Self {
        self.header_min_repeat = repeat;
        self
    }

    /// Run the full normalization pipeline.
    ///
    /// Fails with [`IngestionError::LowQuality`] when nothing meaningful
    /// remains.
    pub fn preprocess(&self, raw: &str) -> Result<String> {
        let text = normalize_line_endings(raw);
        let text = strip_control_chars(&text);

        let repeated = self.repeated_lines(&text);

        let mut out_lines: Vec<String> = Vec::new();
        let mut in_code_block = false;

        for line in text.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with("```") {
                in_code_block = !in_code_block;
                out_lines.push(line.trim_end().to_string());
                continue;
            }

            if in_code_block {
                out_lines.push(line.trim_end().to_string());
                continue;
            }

            // Blank lines are structure: the segmenter splits on them.
            if trimmed.is_empty() {
                out_lines.push(String::new());
                continue;
            }

            if repeated.contains_key(trimmed) {
                continue;
            }

            if trimmed.chars().count() < self.min_line_chars {
                continue;
            }

            out_lines.push(collapse_whitespace(trimmed));
        }

        let joined = out_lines.join("\n");
        let collapsed = collapse_blank_runs(&joined);
        let result = collapsed.trim().to_string();

        if result.is_empty() {
            return Err(IngestionError::LowQuality);
        }
        Ok(result)
    }

    /// Lines repeated often enough to be page headers/footers.
    fn repeated_lines(&self, text: &str) -> HashMap<String, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut in_code_block = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                in_code_block = !in_code_block;
                continue;
            }
            if in_code_block || trimmed.is_empty() || trimmed.chars().count() > self.header_max_len {
                continue;
            }
            *counts.entry(trimmed).or_default() += 1;
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.header_min_repeat)
            .map(|(line, count)| (line.to_string(), count))
            .collect()
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

//! Code-block extraction
//!
//! Splits an agent response into narrative text and ```python fenced blocks.
//! Each block is replaced in the cleaned text by a `PLOT` marker so that text
//! and rendered figures can be interleaved again in their original order.

use crate::models::CodeBlock;
use lazy_static::lazy_static;
use regex::Regex;

/// Placeholder left in the cleaned text where a code block used to be
pub const PLOT_MARKER: &str = "\nPLOT\n";

const CODE_LANGUAGE: &str = "python";

lazy_static! {
    static ref PYTHON_FENCE: Regex = Regex::new(r"(?s)```python(.*?)```").unwrap();
}

/// Cleaned text plus the code blocks removed from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedResponse {
    pub cleaned_text: String,
    pub code_blocks: Vec<CodeBlock>,
    /// Text between markers, `code_blocks.len() + 1` entries
    parts: Vec<String>,
}

/// One step of the interleaved display sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Code(&'a CodeBlock),
}

impl ExtractedResponse {
    /// Text parts and code blocks in display order.
    ///
    /// Text part `i` is followed by code block `i`. Empty text parts are
    /// skipped.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::with_capacity(self.parts.len() + self.code_blocks.len());

        for (i, part) in self.parts.iter().enumerate() {
            let text = part.trim();
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }
            if let Some(block) = self.code_blocks.get(i) {
                segments.push(Segment::Code(block));
            }
        }

        segments
    }

    pub fn has_code(&self) -> bool {
        !self.code_blocks.is_empty()
    }
}

/// Extract ```python blocks from `response_text` and remove them from the text.
///
/// Unterminated fences are left alone as plain text.
pub fn extract_and_clean_code(response_text: &str) -> ExtractedResponse {
    let mut code_blocks = Vec::new();
    let mut cleaned = String::with_capacity(response_text.len());
    let mut parts = Vec::new();
    let mut last_end = 0;

    for caps in PYTHON_FENCE.captures_iter(response_text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        code_blocks.push(CodeBlock {
            index: code_blocks.len(),
            language: CODE_LANGUAGE.to_string(),
            source: body.as_str().trim().to_string(),
        });

        let preceding = &response_text[last_end..whole.start()];
        cleaned.push_str(preceding);
        cleaned.push_str(PLOT_MARKER);
        parts.push(preceding.to_string());

        last_end = whole.end();
    }

    let trailing = &response_text[last_end..];
    cleaned.push_str(trailing);
    parts.push(trailing.to_string());

    ExtractedResponse {
        cleaned_text: cleaned.trim().to_string(),
        code_blocks,
        parts,
    }
}

/// Body of the first ```python block, if any
pub fn first_code_block(text: &str) -> Option<String> {
    PYTHON_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

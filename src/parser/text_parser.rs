//! Plain text parser.

use crate::detect::DocumentFormat;
use crate::error::{Error, Result};
use crate::model::{DocumentBuilder, NormalizedDocument};

use super::math::detect_math_regions;
use super::{DocumentParser, ParseOptions};

/// Plain text passthrough. Paragraphs are split on blank lines and no
/// further structure is inferred.
#[derive(Debug, Default)]
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for TextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Text
    }

    fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
        let body = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::CorruptDocument(format!("text is not valid UTF-8: {}", e)))?;
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        let mut builder = DocumentBuilder::new(DocumentFormat::Text);
        for paragraph in split_paragraphs(&text) {
            builder.push_paragraph(paragraph);
        }
        builder.set_raw_text(text);

        let detect_math = options.detect_math;
        let thresholds = &options.thresholds;
        Ok(builder.finish(|raw| {
            if detect_math {
                detect_math_regions(raw, thresholds)
            } else {
                Vec::new()
            }
        }))
    }
}

/// Split on lines that are empty or whitespace only.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

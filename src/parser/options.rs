//! Parsing options and configuration.

use serde::{Deserialize, Serialize};

/// Options for parsing source documents.
///
/// Options are part of the analysis cache key, so every field is
/// serializable and two equal option sets always serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Whether to extract tables
    pub extract_tables: bool,

    /// Whether to record figures
    pub extract_figures: bool,

    /// Whether to scan for mathematical notation
    pub detect_math: bool,

    /// Whether to use parallel processing
    pub parallel: bool,

    /// Pages to parse (1-indexed, inclusive); `None` parses every page
    pub page_range: Option<(u32, u32)>,

    /// OCR language code (Tesseract naming, e.g. `eng`, `chi_tra`)
    pub ocr_language: String,

    /// Heuristic thresholds
    pub thresholds: Thresholds,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable lenient mode (degrade instead of failing on damaged pages).
    pub fn lenient(mut self) -> Self {
        self.error_mode = ErrorMode::Lenient;
        self
    }

    /// Fail on the first damaged page.
    pub fn strict(mut self) -> Self {
        self.error_mode = ErrorMode::Strict;
        self
    }

    /// Extract text only (no tables, figures or math regions).
    pub fn text_only(mut self) -> Self {
        self.extract_tables = false;
        self.extract_figures = false;
        self.detect_math = false;
        self
    }

    /// Enable or disable table extraction.
    pub fn with_tables(mut self, extract: bool) -> Self {
        self.extract_tables = extract;
        self
    }

    /// Enable or disable math detection.
    pub fn with_math(mut self, detect: bool) -> Self {
        self.detect_math = detect;
        self
    }

    /// Enable or disable parallel processing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Restrict parsing to an inclusive page range.
    pub fn with_pages(mut self, first: u32, last: u32) -> Self {
        self.page_range = Some((first.min(last), first.max(last)));
        self
    }

    /// Set the OCR language.
    pub fn with_ocr_language(mut self, language: impl Into<String>) -> Self {
        self.ocr_language = language.into();
        self
    }

    /// Replace the heuristic thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Whether a page should be parsed.
    pub fn includes_page(&self, page: u32) -> bool {
        match self.page_range {
            Some((first, last)) => page >= first && page <= last,
            None => true,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Lenient,
            extract_tables: true,
            extract_figures: true,
            detect_math: true,
            parallel: true,
            page_range: None,
            ocr_language: "eng".to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Error handling mode during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Fail on any error
    Strict,
    /// Fall back to reduced extraction and record a warning
    #[default]
    Lenient,
}

/// Policy constants used by the extraction heuristics.
///
/// Each threshold moves its heuristic in one direction only: raising a
/// minimum never admits more candidates, raising a maximum never rejects more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum rows for a table candidate to count as good quality (default 2)
    pub table_min_rows: usize,
    /// Minimum columns for a table candidate to count as good quality (default 2)
    pub table_min_cols: usize,
    /// Maximum share of rows whose cell count differs from the widest row (default 0.25)
    pub table_max_raggedness: f32,
    /// Minimum confidence for a table to be kept without a warning (default 0.5)
    pub table_min_confidence: f32,
    /// Stream column edges closer than this many points merge (default 15)
    pub table_column_gap: f32,
    /// Ruling positions within this many points form one grid line (default 2)
    pub table_snap_tolerance: f32,
    /// Rulings shorter than this many points are ignored (default 10)
    pub table_min_ruling_length: f32,
    /// Share of math symbols among non-space characters that marks a math region (default 0.25)
    pub math_symbol_density: f32,
    /// Minimum math symbols in a region (default 4)
    pub math_min_chars: usize,
    /// Font-size ratio over body text that marks a heading (default 1.15)
    pub heading_size_ratio: f32,
    /// Share of thin horizontal strokes among symbol clusters that suggests math in images (default 0.35)
    pub image_math_stroke_ratio: f32,
    /// OCR text shorter than this is flagged as limited (default 20)
    pub min_ocr_text_len: usize,
    /// Image text longer than this is treated as a text document (default 100)
    pub document_text_threshold: usize,
    /// PDF text shorter than this with images present is flagged as scanned (default 100)
    pub min_pdf_text_len: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            table_min_rows: 2,
            table_min_cols: 2,
            table_max_raggedness: 0.25,
            table_min_confidence: 0.5,
            table_column_gap: 15.0,
            table_snap_tolerance: 2.0,
            table_min_ruling_length: 10.0,
            math_symbol_density: 0.25,
            math_min_chars: 4,
            heading_size_ratio: 1.15,
            image_math_stroke_ratio: 0.35,
            min_ocr_text_len: 20,
            document_text_threshold: 100,
            min_pdf_text_len: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_builder() {
        let options = ParseOptions::new()
            .strict()
            .text_only()
            .with_pages(5, 2)
            .sequential();

        assert_eq!(options.error_mode, ErrorMode::Strict);
        assert!(!options.extract_tables);
        assert!(!options.detect_math);
        assert_eq!(options.page_range, Some((2, 5)));
        assert!(options.includes_page(3));
        assert!(!options.includes_page(6));
        assert!(!options.parallel);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert_eq!(options.error_mode, ErrorMode::Lenient);
        assert!(options.parallel);
        assert!(options.extract_tables);
        assert_eq!(options.thresholds.table_min_rows, 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: ParseOptions =
            serde_json::from_str(r#"{"thresholds": {"table_min_rows": 3}}"#).unwrap();
        assert_eq!(options.thresholds.table_min_rows, 3);
        assert_eq!(options.thresholds.table_min_cols, 2);
        assert_eq!(options.ocr_language, "eng");
    }
}

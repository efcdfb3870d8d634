//! Format parsers.
//!
//! Every parser turns raw bytes into a [`NormalizedDocument`]. The
//! [`ParserRegistry`] picks the parser for a detected [`DocumentFormat`].
//!
//! # Example
//!
//! ```
//! use eduparse::parser::{self, ParseOptions};
//!
//! let doc = parser::parse(b"Unit 1\n\nPlants need light.", Some("txt"), &ParseOptions::default())?;
//! assert_eq!(doc.paragraphs.len(), 2);
//! # Ok::<(), eduparse::Error>(())
//! ```

mod backend;
mod content;
mod docx_parser;
mod image_parser;
mod lattice;
mod layout;
mod math;
mod normalize;
mod ocr;
mod options;
mod pdf_parser;
mod table_detector;
mod text_parser;

pub use docx_parser::DocxParser;
pub use image_parser::{looks_like_math, preprocess, ImageParser};
pub use layout::{FontStatistics, LayoutAnalyzer, TextBlock, TextLine, TextSpan};
pub use math::{detect_math_regions, is_math_line};
pub use normalize::{clean_text, CleanupOptions, TextCleaner};
pub use ocr::{OcrEngine, OcrMode, TesseractCli};
pub use options::{ErrorMode, ParseOptions, Thresholds};
pub use pdf_parser::{parse_pdf_date, PdfParser};
pub use text_parser::{split_paragraphs, TextParser};

use crate::detect::{detect_format, DocumentFormat};
use crate::error::{Error, Result};
use crate::model::NormalizedDocument;
use std::collections::HashMap;
use std::sync::Arc;

/// A parser for one or more source formats.
///
/// Parsers hold no per-document state; one instance serves many
/// documents, possibly from several threads at once.
pub trait DocumentParser: Send + Sync {
    /// Short parser name (e.g. `pdf`).
    fn name(&self) -> &'static str;

    /// Whether this parser handles the format.
    fn supports(&self, format: DocumentFormat) -> bool;

    /// Parse a document from bytes.
    fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument>;
}

/// Registry of format parsers.
///
/// Parsers registered later take precedence over earlier ones for the
/// formats they support.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
    by_name: HashMap<&'static str, Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Create a registry with the PDF, DOCX, image and text parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PdfParser::new()));
        registry.register(Arc::new(DocxParser::new()));
        registry.register(Arc::new(ImageParser::default()));
        registry.register(Arc::new(TextParser::new()));
        registry
    }

    /// Create a registry with defaults but a specific OCR engine for images.
    pub fn with_ocr_engine(engine: Arc<dyn OcrEngine>) -> Self {
        let mut registry = Self::with_defaults();
        registry.register(Arc::new(ImageParser::new(engine)));
        registry
    }

    /// Register a parser.
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        self.by_name.insert(parser.name(), parser.clone());
        self.parsers.push(parser);
    }

    /// Get the parser for a format.
    pub fn get(&self, format: DocumentFormat) -> Option<Arc<dyn DocumentParser>> {
        self.parsers
            .iter()
            .rev()
            .find(|p| p.supports(format))
            .cloned()
    }

    /// Get a parser by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn DocumentParser>> {
        self.by_name.get(name).cloned()
    }

    /// Detect the format and parse.
    pub fn parse(
        &self,
        data: &[u8],
        hint: Option<&str>,
        options: &ParseOptions,
    ) -> Result<NormalizedDocument> {
        let format = detect_format(data, hint)?;
        let parser = self
            .get(format)
            .ok_or_else(|| Error::UnsupportedFormat(format!("no parser for {}", format)))?;

        log::debug!("parsing {} input with {} parser", format, parser.name());
        parser.parse(data, options)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse bytes with the default parsers.
pub fn parse(data: &[u8], hint: Option<&str>, options: &ParseOptions) -> Result<NormalizedDocument> {
    ParserRegistry::with_defaults().parse(data, hint, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShoutingTextParser;

    impl DocumentParser for ShoutingTextParser {
        fn name(&self) -> &'static str {
            "shouting"
        }

        fn supports(&self, format: DocumentFormat) -> bool {
            format == DocumentFormat::Text
        }

        fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
            let upper = String::from_utf8_lossy(data).to_uppercase();
            TextParser::new().parse(upper.as_bytes(), options)
        }
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.get(DocumentFormat::Pdf).unwrap().name(), "pdf");
        assert_eq!(registry.get(DocumentFormat::Docx).unwrap().name(), "docx");
        assert_eq!(registry.get(DocumentFormat::Text).unwrap().name(), "text");
        assert_eq!(
            registry
                .get(DocumentFormat::Image(crate::detect::ImageKind::Jpeg))
                .unwrap()
                .name(),
            "image"
        );
        assert!(registry.get_by_name("docx").is_some());
    }

    #[test]
    fn test_empty_registry_rejects() {
        let registry = ParserRegistry::new();
        let err = registry
            .parse(b"plain", None, &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_later_registration_wins() {
        let mut registry = ParserRegistry::with_defaults();
        registry.register(Arc::new(ShoutingTextParser));

        let doc = registry
            .parse(b"quiet words", None, &ParseOptions::default())
            .unwrap();
        assert_eq!(doc.raw_text, "QUIET WORDS");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = b"Chapter 1\n\nCells divide.\n\n1. What is mitosis?";
        let a = parse(text, None, &ParseOptions::default()).unwrap();
        let b = parse(text, None, &ParseOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_binary_without_hint() {
        let err = parse(&[0u8, 159, 146, 150], None, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}

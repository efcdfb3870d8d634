//! # eduparse
//!
//! Educational document parsing and analysis for Rust.
//!
//! PDF, DOCX, image and plain-text sources are normalized into one
//! format-agnostic [`NormalizedDocument`], then analyzed for questions,
//! learning objectives, concepts and document type. Text and images can be
//! fused into content blocks, results can be cached by content hash, and
//! analyses export to JSON, Markdown or an LMS content package.
//!
//! ## Quick Start
//!
//! ```no_run
//! use eduparse::{analyze_file, to_markdown};
//!
//! fn main() -> eduparse::Result<()> {
//!     let analysis = analyze_file("quiz.docx")?;
//!     for question in &analysis.questions {
//!         println!("{}: {} ({})", question.number, question.text, question.question_type);
//!     }
//!     println!("{}", to_markdown(&analysis));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Format detection**: magic bytes first, extension or MIME hint second
//! - **Structure**: headings, outline, tables (stream and lattice), figures, math regions
//! - **Questions**: numbered questions with lettered options, including CJK markers
//! - **Fusion**: paragraphs linked to the figures they reference
//! - **Caching**: content-addressed, batch LRU eviction, self-healing
//! - **Enrichment**: optional provider seam with timeout and retries
//! - **Parallel processing**: Rayon for PDF pages, images and batches

pub mod analysis;
pub mod cache;
pub mod detect;
pub mod enrich;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod pipeline;

// Re-export commonly used types
pub use analysis::{extract_questions, AnalysisOptions, DocumentAnalyzer, FusionOptions};
pub use cache::{AnalysisCache, CacheConfig, CacheKey, CacheStats};
pub use detect::{detect_format, detect_format_from_path, DocumentFormat, ImageKind};
pub use enrich::{AnalysisDepth, Enricher, EnrichmentOptions, EnrichmentProvider};
pub use error::{Error, Result};
pub use export::{
    to_json, to_lms_package, to_markdown, ExportOptions, JsonFormat, PackageHandle,
};
pub use model::{
    CombinedAnalysis, ContentBlock, DocumentAnalysis, DocumentType, ExtractionWarning, FigureRef,
    Metadata, NormalizedDocument, Outline, Question, QuestionOption, QuestionType, TableBlock,
};
pub use parser::{DocumentParser, ErrorMode, ParseOptions, ParserRegistry, Thresholds};
pub use pipeline::Eduparse;

use std::path::Path;

/// Parse a file into a normalized document.
///
/// The file extension is used as a format hint when the content signature is
/// inconclusive.
///
/// # Example
///
/// ```no_run
/// use eduparse::parse_file;
///
/// let doc = parse_file("syllabus.pdf").unwrap();
/// println!("{} paragraphs", doc.paragraphs.len());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<NormalizedDocument> {
    parse_file_with_options(path, &ParseOptions::default())
}

/// Parse a file with custom options.
pub fn parse_file_with_options<P: AsRef<Path>>(
    path: P,
    options: &ParseOptions,
) -> Result<NormalizedDocument> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let hint = path.extension().and_then(|e| e.to_str());
    parser::parse(&data, hint, options)
}

/// Parse bytes with an optional format hint (extension or MIME type).
///
/// # Example
///
/// ```
/// use eduparse::{parse_bytes, DocumentFormat};
///
/// let doc = parse_bytes(b"1. What is 2+2?\nA. 3\nB. 4", Some("txt")).unwrap();
/// assert_eq!(doc.format, DocumentFormat::Text);
/// ```
pub fn parse_bytes(data: &[u8], hint: Option<&str>) -> Result<NormalizedDocument> {
    parser::parse(data, hint, &ParseOptions::default())
}

/// Parse and analyze a file with default settings (no cache, no enrichment).
pub fn analyze_file<P: AsRef<Path>>(path: P) -> Result<DocumentAnalysis> {
    Eduparse::new()?.analyze_file(path)
}

/// Parse and analyze bytes with default settings.
///
/// # Example
///
/// ```
/// use eduparse::{analyze_bytes, QuestionType};
///
/// let analysis = analyze_bytes(b"1. What is 2+2?\nA. 3\nB. 4\n2. Explain gravity.", None).unwrap();
/// assert_eq!(analysis.questions.len(), 2);
/// assert_eq!(analysis.questions[0].question_type, QuestionType::MultipleChoice);
/// ```
pub fn analyze_bytes(data: &[u8], hint: Option<&str>) -> Result<DocumentAnalysis> {
    Eduparse::new()?.analyze(data, hint)
}

/// Extract plain text from a file.
pub fn extract_text<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(parse_file(path)?.raw_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_empty_data() {
        let result = parse_bytes(&[], None);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_parse_bytes_unknown_magic() {
        let data = [0xFF, 0xFE, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        assert!(parse_bytes(&data, None).is_err());
    }

    #[test]
    fn test_parse_bytes_truncated_pdf() {
        let result = parse_bytes(b"%PDF-1.7\n%broken", None);
        assert!(matches!(result, Err(Error::CorruptDocument(_))));
    }

    #[test]
    fn test_analyze_bytes_text() {
        let analysis = analyze_bytes(b"Learning objectives:\n- Add fractions\n", Some("txt")).unwrap();
        assert_eq!(analysis.learning_objectives, vec!["Add fractions"]);
        assert!(!analysis.incomplete);
    }

    #[test]
    fn test_extract_text_missing_file() {
        let result = extract_text("/nonexistent/eduparse/file.txt");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

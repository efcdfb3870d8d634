//! Error types for eduparse library.

use std::io;
use thiserror::Error;

/// Result type alias for eduparse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing, analyzing or exporting documents.
///
/// Only [`Error::UnsupportedFormat`], [`Error::CorruptDocument`] and I/O
/// failures reach the caller of the pipeline. Cache and enrichment failures
/// are recovered internally and show up as degraded results instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No parser can handle the input, or the format could not be determined.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The format was recognized but the decoder rejected the content.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// A cache entry could not be read back. Never surfaced by the pipeline.
    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    /// The optional enrichment step failed or timed out.
    #[error("Enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    /// OCR engine failure.
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Error while writing an export artifact.
    #[error("Export error: {0}")]
    Export(String),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid option value.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Whether this error is reported to callers rather than absorbed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::CacheCorruption(_) | Error::EnrichmentUnavailable(_)
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::CorruptDocument(format!("pdf: {}", err)),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            _ => Error::CorruptDocument(format!("zip: {}", err)),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::CorruptDocument(format!("xml: {}", err))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Error::Io(e),
            image::ImageError::Unsupported(e) => Error::UnsupportedFormat(e.to_string()),
            _ => Error::CorruptDocument(format!("image: {}", err)),
        }
    }
}

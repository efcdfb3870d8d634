//! Document model types.
//!
//! This module defines the intermediate representation that bridges the
//! format parsers, the analyzers and the exporters. The model is
//! format-agnostic and can represent content from any supported source.

mod analysis;
mod document;
mod figure;
mod question;
mod table;

pub use analysis::{
    CombinedAnalysis, ContentBlock, DocumentAnalysis, DocumentType, EducationalValue, Enrichment,
    ImageAnalysis, TextAnalysis,
};
pub use document::{
    count_words, DocumentBuilder, ExtractionWarning, Heading, Metadata, NormalizedDocument,
    Outline, OutlineItem, Span,
};
pub(crate) use document::is_cjk;
pub use figure::{BoundingBox, FigureRef};
pub use question::{Question, QuestionOption, QuestionType};
pub use table::{TableBlock, TableContext, TableMethod};

//! Exporters: JSON, Markdown and LMS content packages.
//!
//! All exporters are stateless transforms of a [`DocumentAnalysis`]; only the
//! package writer touches the filesystem.
//!
//! [`DocumentAnalysis`]: crate::model::DocumentAnalysis

mod json;
mod markdown;
mod package;

pub use json::{to_json, JsonFormat};
pub use markdown::{document_to_markdown, to_markdown, MarkdownOptions, MarkdownRenderer};
pub use package::{
    estimate_difficulty, estimate_minutes, to_lms_package, Difficulty, PackageHandle,
    PackageMetadata, PackageWriter,
};

use serde::{Deserialize, Serialize};

/// Options for exporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// JSON layout for `metadata.json` and `analysis.json` (default pretty)
    pub json_format: JsonFormat,
    /// Also write `<package>.zip` (default false)
    pub zip: bool,
    /// Reading pace for time estimates (default 5.0)
    pub estimated_minutes_per_1000_words: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            json_format: JsonFormat::Pretty,
            zip: false,
            estimated_minutes_per_1000_words: 5.0,
        }
    }
}

impl ExportOptions {
    pub fn with_json_format(mut self, format: JsonFormat) -> Self {
        self.json_format = format;
        self
    }

    pub fn with_zip(mut self, zip: bool) -> Self {
        self.zip = zip;
        self
    }

    pub fn with_reading_pace(mut self, minutes_per_1000_words: f32) -> Self {
        self.estimated_minutes_per_1000_words = minutes_per_1000_words.max(0.0);
        self
    }
}

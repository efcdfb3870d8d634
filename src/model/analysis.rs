//! Analysis results layered on top of a normalized document.

use super::{NormalizedDocument, Question};
use crate::detect::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of educational document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Syllabus,
    Exam,
    Worksheet,
    LessonPlan,
    LectureNotes,
    #[default]
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Syllabus => "syllabus",
            DocumentType::Exam => "exam",
            DocumentType::Worksheet => "worksheet",
            DocumentType::LessonPlan => "lesson_plan",
            DocumentType::LectureNotes => "lecture_notes",
            DocumentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplementary annotations from the optional enrichment step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: Option<String>,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub suggested_activities: Vec<String>,
    /// Provider-specific fields kept verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Complete analysis of one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Hex SHA-256 of the source bytes
    pub fingerprint: String,

    pub format: DocumentFormat,

    pub document: NormalizedDocument,

    pub document_type: DocumentType,

    pub questions: Vec<Question>,

    pub learning_objectives: Vec<String>,

    /// Key concepts, structural ones first, enrichment additions after
    pub concepts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,

    /// Set when enrichment was requested but did not complete
    #[serde(default)]
    pub incomplete: bool,
}

impl DocumentAnalysis {
    /// Document title, falling back to the first heading.
    pub fn title(&self) -> &str {
        self.document.metadata.display_title(&self.document)
    }

    /// Merge enrichment output without touching structural results.
    pub fn merge_enrichment(&mut self, enrichment: Enrichment) {
        for concept in &enrichment.key_concepts {
            let concept = concept.trim().to_lowercase();
            if !concept.is_empty() && !self.concepts.contains(&concept) {
                self.concepts.push(concept);
            }
        }
        self.enrichment = Some(enrichment);
        self.incomplete = false;
    }
}

/// Result of analyzing one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub image_id: String,
    pub detected_concepts: BTreeSet<String>,
    /// OCR text, when the analyzer ran OCR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ImageAnalysis {
    pub fn new(image_id: impl Into<String>, detected_concepts: BTreeSet<String>) -> Self {
        Self {
            image_id: image_id.into(),
            detected_concepts,
            text: None,
        }
    }
}

/// Text-side analysis used by fusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    /// Paragraphs split on blank lines
    pub paragraphs: Vec<String>,
    /// Concepts per paragraph, parallel to `paragraphs`
    pub paragraph_concepts: Vec<BTreeSet<String>>,
    /// Union of all paragraph concepts
    pub concepts: BTreeSet<String>,
}

/// A paragraph fused with the images it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub paragraph_index: usize,
    pub paragraph_content: String,
    pub related_images: Vec<ImageAnalysis>,
    pub integrated_concepts: BTreeSet<String>,
}

/// Aggregate scores of how well text and images support each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationalValue {
    /// Integrated concepts over all concepts, in `[0, 1]`
    pub concept_integration: f32,
    /// Share of paragraphs backed by at least one image, in `[0, 1]`
    pub visual_support: f32,
    /// Share of supplied images that the text references, in `[0, 1]`
    pub image_utilization: f32,
    /// Weighted combination, in `[0, 1]`
    pub overall: f32,
    pub recommendations: Vec<String>,
}

/// Output of multi-modal fusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    pub text_analysis: TextAnalysis,
    pub image_analyses: BTreeMap<String, ImageAnalysis>,
    /// Images whose analysis failed; omitted from content blocks
    pub failed_images: Vec<String>,
    pub content_blocks: Vec<ContentBlock>,
    pub educational_value: EducationalValue,
}

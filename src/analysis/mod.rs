//! Structural analysis of normalized documents.
//!
//! Question segmentation, document classification, learning objectives,
//! concept extraction and multi-modal fusion. Everything here is a pure
//! function of its inputs.

mod classify;
mod concepts;
mod fusion;
mod patterns;
mod questions;

pub use classify::{classify_document, extract_learning_objectives};
pub use concepts::{ConceptExtractor, KeywordConceptExtractor};
pub use fusion::{analyze_text, fuse, FusionOptions, ImageAnalyzer, MultiModalAnalyzer, OcrImageAnalyzer};
pub use patterns::{LineMatch, LinePattern, PatternGroup, RegexPattern};
pub use questions::{extract_questions, QuestionAnalyzer};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{DocumentAnalysis, NormalizedDocument};

/// Options for document analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Questions without options longer than this many characters are essays (default 40)
    pub essay_min_chars: usize,

    /// Question count that marks a worksheet or exam without keywords (default 3)
    pub multiple_questions_threshold: usize,

    /// Minimum length of a Latin concept token (default 3)
    pub concept_min_len: usize,

    /// Maximum number of concepts kept (default 20)
    pub max_concepts: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            essay_min_chars: 40,
            multiple_questions_threshold: 3,
            concept_min_len: 3,
            max_concepts: 20,
        }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_essay_min_chars(mut self, chars: usize) -> Self {
        self.essay_min_chars = chars;
        self
    }

    pub fn with_max_concepts(mut self, max: usize) -> Self {
        self.max_concepts = max;
        self
    }
}

/// Runs every structural analysis over a normalized document.
pub struct DocumentAnalyzer {
    options: AnalysisOptions,
    questions: QuestionAnalyzer,
    concepts: Arc<dyn ConceptExtractor>,
}

impl DocumentAnalyzer {
    pub fn new(options: AnalysisOptions) -> Result<Self> {
        let concepts = Arc::new(KeywordConceptExtractor::new(
            options.concept_min_len,
            options.max_concepts,
        ));
        Ok(Self {
            questions: QuestionAnalyzer::new(&options)?,
            options,
            concepts,
        })
    }

    /// Replace the concept extractor.
    pub fn with_concept_extractor(mut self, extractor: Arc<dyn ConceptExtractor>) -> Self {
        self.concepts = extractor;
        self
    }

    pub fn concept_extractor(&self) -> Arc<dyn ConceptExtractor> {
        self.concepts.clone()
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Analyze a parsed document. `fingerprint` identifies the source bytes.
    pub fn analyze(&self, document: NormalizedDocument, fingerprint: String) -> DocumentAnalysis {
        let text = document.raw_text.as_str();
        let questions = self.questions.analyze(text);
        let document_type = classify_document(text, &questions, &self.options);
        let learning_objectives = extract_learning_objectives(text);
        let concepts = self.concepts.extract(text);

        log::info!(
            "analysis: {} with {} question(s), {} concept(s)",
            document_type,
            questions.len(),
            concepts.len()
        );

        DocumentAnalysis {
            fingerprint,
            format: document.format,
            document,
            document_type,
            questions,
            learning_objectives,
            concepts,
            enrichment: None,
            incomplete: false,
        }
    }
}

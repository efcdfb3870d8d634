//! Multi-modal fusion of text and image analyses.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::concepts::{ConceptExtractor, KeywordConceptExtractor};
use crate::error::{Error, Result};
use crate::model::{
    CombinedAnalysis, ContentBlock, EducationalValue, ImageAnalysis, TextAnalysis,
};
use crate::parser::{preprocess, split_paragraphs, OcrEngine, OcrMode, TesseractCli};

/// Analyzes one image into detected concepts.
pub trait ImageAnalyzer: Send + Sync {
    fn analyze(&self, image_id: &str, data: &[u8]) -> Result<ImageAnalysis>;
}

/// Image analyzer that runs OCR and extracts concepts from the recognized text.
pub struct OcrImageAnalyzer {
    engine: Arc<dyn OcrEngine>,
    extractor: Arc<dyn ConceptExtractor>,
    language: String,
}

impl OcrImageAnalyzer {
    pub fn new(engine: Arc<dyn OcrEngine>, extractor: Arc<dyn ConceptExtractor>) -> Self {
        Self {
            engine,
            extractor,
            language: "eng".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl Default for OcrImageAnalyzer {
    fn default() -> Self {
        Self::new(
            Arc::new(TesseractCli::new()),
            Arc::new(KeywordConceptExtractor::default()),
        )
    }
}

impl ImageAnalyzer for OcrImageAnalyzer {
    fn analyze(&self, image_id: &str, data: &[u8]) -> Result<ImageAnalysis> {
        if !self.engine.is_available() {
            return Err(Error::Ocr(format!("{} is not available", self.engine.name())));
        }

        let img = image::load_from_memory(data)?;
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(preprocess(&img))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let text = self
            .engine
            .recognize(&png, OcrMode::Standard, &self.language)?;

        let mut analysis = ImageAnalysis::new(image_id, self.extractor.extract_set(&text));
        analysis.text = Some(text);
        Ok(analysis)
    }
}

/// Score weights and recommendation cut-offs for fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionOptions {
    /// Weight of concept integration in the overall score (default 0.6)
    pub concept_weight: f32,
    /// Weight of visual support in the overall score (default 0.4)
    pub visual_weight: f32,
    /// Integration below this triggers a recommendation (default 0.3)
    pub min_concept_integration: f32,
    /// Visual support below this triggers a recommendation (default 0.2)
    pub min_visual_support: f32,
    /// Analyze images on the rayon pool (default true)
    pub parallel: bool,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            concept_weight: 0.6,
            visual_weight: 0.4,
            min_concept_integration: 0.3,
            min_visual_support: 0.2,
            parallel: true,
        }
    }
}

/// Fuses a document's text with the images it references.
pub struct MultiModalAnalyzer {
    concepts: Arc<dyn ConceptExtractor>,
    images: Arc<dyn ImageAnalyzer>,
    options: FusionOptions,
}

impl MultiModalAnalyzer {
    pub fn new(concepts: Arc<dyn ConceptExtractor>, images: Arc<dyn ImageAnalyzer>) -> Self {
        Self {
            concepts,
            images,
            options: FusionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FusionOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyze text and images independently, then fuse them.
    ///
    /// A failing image is recorded in `failed_images` and left out of every
    /// block's `related_images`.
    pub fn analyze_mixed(&self, text: &str, images: &BTreeMap<String, Vec<u8>>) -> CombinedAnalysis {
        let text_analysis = analyze_text(text, self.concepts.as_ref());

        let analyze = |(id, data): (&String, &Vec<u8>)| (id.clone(), self.images.analyze(id, data));
        let results: Vec<(String, Result<ImageAnalysis>)> = if self.options.parallel {
            images.par_iter().map(analyze).collect()
        } else {
            images.iter().map(analyze).collect()
        };

        let mut analyses = BTreeMap::new();
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(analysis) => {
                    analyses.insert(id, analysis);
                }
                Err(e) => {
                    log::warn!("image {} analysis failed: {}", id, e);
                    failed.push(id);
                }
            }
        }

        let ids: Vec<String> = images.keys().cloned().collect();
        fuse(text_analysis, analyses, failed, &ids, &self.options)
    }
}

/// Split text into paragraphs and extract concepts per paragraph.
pub fn analyze_text(text: &str, extractor: &dyn ConceptExtractor) -> TextAnalysis {
    let paragraphs = split_paragraphs(text);
    let paragraph_concepts: Vec<BTreeSet<String>> =
        paragraphs.iter().map(|p| extractor.extract_set(p)).collect();
    let concepts = paragraph_concepts.iter().flatten().cloned().collect();

    TextAnalysis {
        paragraphs,
        paragraph_concepts,
        concepts,
    }
}

/// Regex that finds references to one figure id.
fn reference_pattern(id: &str) -> Result<Regex> {
    let id = regex::escape(id);
    Regex::new(&format!(
        r"(?:圖表|圖|(?:^|[^A-Za-z])(?i:fig(?:ure)?\.?))\s*{}(?:[^0-9A-Za-z]|$)",
        id
    ))
    .map_err(|e| Error::InvalidOptions(format!("figure id pattern: {}", e)))
}

/// Fuse precomputed text and image analyses.
///
/// `image_ids` lists every supplied image, including failed ones, so
/// references to failed images still produce blocks.
pub fn fuse(
    text_analysis: TextAnalysis,
    image_analyses: BTreeMap<String, ImageAnalysis>,
    failed_images: Vec<String>,
    image_ids: &[String],
    options: &FusionOptions,
) -> CombinedAnalysis {
    let patterns: Vec<(&String, Regex)> = image_ids
        .iter()
        .filter_map(|id| match reference_pattern(id) {
            Ok(re) => Some((id, re)),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        })
        .collect();

    let mut content_blocks = Vec::new();
    let mut referenced: BTreeSet<&str> = BTreeSet::new();

    for (index, paragraph) in text_analysis.paragraphs.iter().enumerate() {
        let refs: Vec<&String> = patterns
            .iter()
            .filter(|(_, re)| re.is_match(paragraph))
            .map(|(id, _)| *id)
            .collect();
        if refs.is_empty() {
            continue;
        }

        let text_concepts = &text_analysis.paragraph_concepts[index];
        let mut related_images = Vec::new();
        let mut integrated_concepts = BTreeSet::new();
        for id in refs {
            referenced.insert(id.as_str());
            if let Some(image) = image_analyses.get(id) {
                integrated_concepts.extend(
                    text_concepts
                        .intersection(&image.detected_concepts)
                        .cloned(),
                );
                related_images.push(image.clone());
            }
        }

        content_blocks.push(ContentBlock {
            paragraph_index: index,
            paragraph_content: paragraph.clone(),
            related_images,
            integrated_concepts,
        });
    }

    let educational_value = score(
        &text_analysis,
        &image_analyses,
        &failed_images,
        &content_blocks,
        &referenced,
        options,
    );

    CombinedAnalysis {
        text_analysis,
        image_analyses,
        failed_images,
        content_blocks,
        educational_value,
    }
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

fn score(
    text: &TextAnalysis,
    images: &BTreeMap<String, ImageAnalysis>,
    failed: &[String],
    blocks: &[ContentBlock],
    referenced: &BTreeSet<&str>,
    options: &FusionOptions,
) -> EducationalValue {
    let all_concepts: BTreeSet<&String> = text
        .concepts
        .iter()
        .chain(images.values().flat_map(|i| i.detected_concepts.iter()))
        .collect();
    let integrated: BTreeSet<&String> = blocks
        .iter()
        .flat_map(|b| b.integrated_concepts.iter())
        .collect();

    let concept_integration = ratio(integrated.len(), all_concepts.len());
    let visual_support = ratio(
        blocks.iter().filter(|b| !b.related_images.is_empty()).count(),
        text.paragraphs.len(),
    );
    let used = images.keys().filter(|id| referenced.contains(id.as_str())).count();
    let image_utilization = ratio(used, images.len());

    let weights = options.concept_weight + options.visual_weight;
    let overall = if weights > 0.0 {
        (options.concept_weight * concept_integration + options.visual_weight * visual_support)
            / weights
    } else {
        0.0
    };

    let mut recommendations = Vec::new();
    if !images.is_empty() && concept_integration < options.min_concept_integration {
        recommendations
            .push("Align figure content with the concepts discussed in the surrounding text".to_string());
    }
    if !text.paragraphs.is_empty() && visual_support < options.min_visual_support {
        recommendations.push("Add figures that support the key paragraphs".to_string());
    }
    for id in images.keys().filter(|id| !referenced.contains(id.as_str())) {
        recommendations.push(format!("Reference figure {} in the text", id));
    }
    for id in failed {
        recommendations.push(format!("Image {} could not be analyzed", id));
    }

    EducationalValue {
        concept_integration,
        visual_support,
        image_utilization,
        overall,
        recommendations,
    }
}

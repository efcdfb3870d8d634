//! Integration tests for question extraction and multi-modal fusion.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use eduparse::analysis::{
    ConceptExtractor, FusionOptions, ImageAnalyzer, KeywordConceptExtractor, MultiModalAnalyzer,
};
use eduparse::model::ImageAnalysis;
use eduparse::{extract_questions, Error, QuestionType, Result};

/// Treats the image bytes as a whitespace-separated concept list; `fail`
/// makes analysis fail.
struct ListedConcepts;

impl ImageAnalyzer for ListedConcepts {
    fn analyze(&self, image_id: &str, data: &[u8]) -> Result<ImageAnalysis> {
        let text = String::from_utf8_lossy(data);
        if text.trim() == "fail" {
            return Err(Error::Ocr(format!("cannot read {}", image_id)));
        }
        let concepts: BTreeSet<String> = text.split_whitespace().map(str::to_lowercase).collect();
        Ok(ImageAnalysis::new(image_id, concepts))
    }
}

#[test]
fn test_two_questions_from_worked_example() {
    let questions = extract_questions("1. What is 2+2?\nA. 3\nB. 4\n2. Explain gravity.").unwrap();

    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].number, "1");
    assert_eq!(questions[0].text, "What is 2+2?");
    assert_eq!(questions[0].question_type, QuestionType::MultipleChoice);
    let options: Vec<(&str, &str)> = questions[0]
        .options
        .iter()
        .map(|o| (o.label.as_str(), o.text.as_str()))
        .collect();
    assert_eq!(options, vec![("A", "3"), ("B", "4")]);

    // 16 characters is below the 40-character essay threshold.
    assert!(questions[1].options.is_empty());
    assert_eq!(questions[1].question_type, QuestionType::Unknown);
}

#[test]
fn test_option_before_any_question_is_dropped() {
    let questions = extract_questions("A. stray option\n1. Real question?\nA. yes\nB. no").unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].options.len(), 2);
}

#[test]
fn test_fusion_concepts_are_shared_by_text_and_images() {
    let extractor: Arc<dyn ConceptExtractor> = Arc::new(KeywordConceptExtractor::default());
    let analyzer = MultiModalAnalyzer::new(Arc::clone(&extractor), Arc::new(ListedConcepts))
        .with_options(FusionOptions::default());

    let text = "\
Photosynthesis converts light energy in chloroplasts (Figure 1).

Cellular respiration releases energy, compare Figure 1 and Figure 2.

Mitochondria appear in Figure 3.

Nothing visual here.";

    let mut images = BTreeMap::new();
    images.insert("1".to_string(), b"photosynthesis chloroplasts leaf".to_vec());
    images.insert("2".to_string(), b"respiration glucose energy".to_vec());
    images.insert("3".to_string(), b"fail".to_vec());

    let combined = analyzer.analyze_mixed(text, &images);

    assert_eq!(combined.failed_images, vec!["3"]);
    assert_eq!(combined.content_blocks.len(), 3);

    for block in &combined.content_blocks {
        let text_concepts = extractor.extract_set(&block.paragraph_content);
        let image_concepts: BTreeSet<String> = block
            .related_images
            .iter()
            .flat_map(|img| img.detected_concepts.iter().cloned())
            .collect();
        let allowed: BTreeSet<String> = text_concepts.intersection(&image_concepts).cloned().collect();
        assert!(block.integrated_concepts.is_subset(&allowed));
        assert!(block.related_images.iter().all(|img| img.image_id != "3"));
    }

    let mitochondria = &combined.content_blocks[2];
    assert!(mitochondria.related_images.is_empty());
    assert!(mitochondria.integrated_concepts.is_empty());

    let respiration = &combined.content_blocks[1];
    assert_eq!(respiration.related_images.len(), 2);
    assert!(respiration.integrated_concepts.contains("energy"));
    assert!(combined.educational_value.overall > 0.0);
}

//! End-to-end orchestration: detect, parse, analyze, enrich, cache.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::{
    AnalysisOptions, DocumentAnalyzer, FusionOptions, ImageAnalyzer, MultiModalAnalyzer,
    OcrImageAnalyzer,
};
use crate::cache::{content_hash, AnalysisCache, CacheConfig, CacheKey};
use crate::detect::{detect_format, DocumentFormat};
use crate::enrich::{AnalysisDepth, Enricher};
use crate::error::{Error, Result};
use crate::model::{CombinedAnalysis, DocumentAnalysis, NormalizedDocument};
use crate::parser::{
    DocumentParser, ImageParser, OcrEngine, ParseOptions, ParserRegistry, TesseractCli,
};

/// Everything besides the content that determines an analysis result.
#[derive(Serialize)]
struct CacheScope<'a> {
    format: DocumentFormat,
    parse: &'a ParseOptions,
    analysis: &'a AnalysisOptions,
    enrichment: Option<AnalysisDepth>,
}

/// Builder-style entry point for analyzing educational documents.
///
/// # Example
///
/// ```no_run
/// use eduparse::{CacheConfig, Eduparse, ParseOptions};
///
/// let pipeline = Eduparse::new()?
///     .with_options(ParseOptions::new().with_math(true))
///     .with_cache(CacheConfig::new(".eduparse-cache"))?;
/// let analysis = pipeline.analyze_file("worksheet.docx")?;
/// println!("{} questions", analysis.questions.len());
/// # Ok::<(), eduparse::Error>(())
/// ```
pub struct Eduparse {
    options: ParseOptions,
    registry: ParserRegistry,
    analyzer: DocumentAnalyzer,
    cache: Option<AnalysisCache>,
    enricher: Option<Enricher>,
    ocr_engine: Arc<dyn OcrEngine>,
    image_analyzer: Option<Arc<dyn ImageAnalyzer>>,
    fusion_options: FusionOptions,
}

impl Eduparse {
    /// Default parsers, default analysis options, no cache, no enrichment.
    pub fn new() -> Result<Self> {
        Ok(Self {
            options: ParseOptions::default(),
            registry: ParserRegistry::with_defaults(),
            analyzer: DocumentAnalyzer::new(AnalysisOptions::default())?,
            cache: None,
            enricher: None,
            ocr_engine: Arc::new(TesseractCli::new()),
            image_analyzer: None,
            fusion_options: FusionOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_analysis_options(mut self, options: AnalysisOptions) -> Result<Self> {
        let extractor = self.analyzer.concept_extractor();
        self.analyzer = DocumentAnalyzer::new(options)?.with_concept_extractor(extractor);
        Ok(self)
    }

    /// Open (or create) a cache for analysis results.
    pub fn with_cache(mut self, config: CacheConfig) -> Result<Self> {
        log::debug!("pipeline cache at {}", config.dir.display());
        self.cache = Some(AnalysisCache::open(config)?);
        Ok(self)
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Use a specific OCR engine for image documents and image analysis.
    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.registry
            .register(Arc::new(ImageParser::new(Arc::clone(&engine))));
        self.ocr_engine = engine;
        self
    }

    pub fn with_image_analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.image_analyzer = Some(analyzer);
        self
    }

    pub fn with_fusion_options(mut self, options: FusionOptions) -> Self {
        self.fusion_options = options;
        self
    }

    /// Register an additional parser; it takes precedence for its formats.
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.registry.register(parser);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&AnalysisCache> {
        self.cache.as_ref()
    }

    /// Parse without analysis.
    pub fn parse(&self, data: &[u8], hint: Option<&str>) -> Result<NormalizedDocument> {
        self.registry.parse(data, hint, &self.options)
    }

    /// Full analysis of one document.
    ///
    /// Cache and enrichment failures are absorbed: the structural analysis is
    /// still returned, flagged `incomplete` when enrichment was unavailable.
    pub fn analyze(&self, data: &[u8], hint: Option<&str>) -> Result<DocumentAnalysis> {
        let format = detect_format(data, hint)?;
        let fingerprint = content_hash(data);

        let key = match &self.cache {
            Some(_) => Some(self.cache_key(fingerprint.clone(), format)?),
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get_by_key(key) {
                log::info!("cache hit for {}", &fingerprint[..12.min(fingerprint.len())]);
                return Ok(hit);
            }
        }

        let parser = self
            .registry
            .get(format)
            .ok_or_else(|| Error::UnsupportedFormat(format!("no parser registered for {}", format)))?;
        log::debug!("parsing {} input with {} parser", format, parser.name());
        let document = parser.parse(data, &self.options)?;

        let mut analysis = self.analyzer.analyze(document, fingerprint);
        if let Some(enricher) = &self.enricher {
            enricher.apply(&mut analysis);
        }

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.set_by_key(key, &analysis) {
                log::warn!("could not cache analysis: {}", e);
            }
        }
        Ok(analysis)
    }

    /// Analyze a file; its extension is the format hint.
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<DocumentAnalysis> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let hint = path.extension().and_then(|e| e.to_str());
        self.analyze(&data, hint)
    }

    /// Analyze many documents. Results are in input order; one failure does
    /// not affect the others.
    pub fn analyze_batch(&self, inputs: Vec<(Vec<u8>, Option<String>)>) -> Vec<Result<DocumentAnalysis>> {
        let run = |(data, hint): &(Vec<u8>, Option<String>)| self.analyze(data, hint.as_deref());
        if self.options.parallel {
            inputs.par_iter().map(run).collect()
        } else {
            inputs.iter().map(run).collect()
        }
    }

    /// Fuse free text with the images it references (`id -> bytes`).
    pub fn analyze_mixed(&self, text: &str, images: &BTreeMap<String, Vec<u8>>) -> CombinedAnalysis {
        let concepts = self.analyzer.concept_extractor();
        let image_analyzer: Arc<dyn ImageAnalyzer> = match &self.image_analyzer {
            Some(analyzer) => Arc::clone(analyzer),
            None => Arc::new(
                OcrImageAnalyzer::new(Arc::clone(&self.ocr_engine), Arc::clone(&concepts))
                    .with_language(self.options.ocr_language.clone()),
            ),
        };
        MultiModalAnalyzer::new(concepts, image_analyzer)
            .with_options(self.fusion_options.clone())
            .analyze_mixed(text, images)
    }

    fn cache_key(&self, fingerprint: String, format: DocumentFormat) -> Result<CacheKey> {
        let scope = CacheScope {
            format,
            parse: &self.options,
            analysis: self.analyzer.options(),
            enrichment: self.enricher.as_ref().map(|e| e.options().depth),
        };
        CacheKey::from_fingerprint(fingerprint, &scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{EnrichmentOptions, EnrichmentProvider, EnrichmentRequest};
    use crate::model::{DocumentType, Enrichment, ImageAnalysis, QuestionType};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WORKSHEET: &[u8] = b"Forces worksheet\n\n1. What is 2+2?\nA. 3\nB. 4\n2. Explain gravity.\n";

    struct CountingParser {
        calls: AtomicUsize,
    }

    impl DocumentParser for CountingParser {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports(&self, format: DocumentFormat) -> bool {
            format == DocumentFormat::Text
        }

        fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            crate::parser::TextParser.parse(data, options)
        }
    }

    struct DownProvider;

    impl EnrichmentProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn enrich(&self, _request: &EnrichmentRequest) -> Result<Enrichment> {
            Err(Error::EnrichmentUnavailable("503".into()))
        }
    }

    struct TagImages;

    impl ImageAnalyzer for TagImages {
        fn analyze(&self, image_id: &str, data: &[u8]) -> Result<ImageAnalysis> {
            let text = String::from_utf8_lossy(data).to_string();
            let concepts: BTreeSet<String> = text.split_whitespace().map(str::to_string).collect();
            Ok(ImageAnalysis::new(image_id, concepts))
        }
    }

    #[test]
    fn test_analyze_text_document() {
        let pipeline = Eduparse::new().unwrap();
        let analysis = pipeline.analyze(WORKSHEET, Some("txt")).unwrap();

        assert_eq!(analysis.format, DocumentFormat::Text);
        assert_eq!(analysis.questions.len(), 2);
        assert_eq!(analysis.questions[0].question_type, QuestionType::MultipleChoice);
        assert_eq!(analysis.document_type, DocumentType::Worksheet);
        assert_eq!(analysis.fingerprint, content_hash(WORKSHEET));
    }

    #[test]
    fn test_cache_hit_skips_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let parser = Arc::new(CountingParser {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Eduparse::new()
            .unwrap()
            .with_parser(parser.clone())
            .with_cache(CacheConfig::new(dir.path()))
            .unwrap();

        let first = pipeline.analyze(WORKSHEET, Some("txt")).unwrap();
        let second = pipeline.analyze(WORKSHEET, Some("txt")).unwrap();
        assert_eq!(first, second);
        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.cache().unwrap().len(), 1);
    }

    #[test]
    fn test_options_change_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let a = Eduparse::new()
            .unwrap()
            .with_cache(CacheConfig::new(dir.path()))
            .unwrap();
        a.analyze(WORKSHEET, Some("txt")).unwrap();

        let b = Eduparse::new()
            .unwrap()
            .with_options(ParseOptions::new().with_math(false))
            .with_cache(CacheConfig::new(dir.path()))
            .unwrap();
        b.analyze(WORKSHEET, Some("txt")).unwrap();
        assert_eq!(b.cache().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_enrichment_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = Enricher::new(Arc::new(DownProvider)).with_options(
            EnrichmentOptions::default()
                .with_max_attempts(2)
                .with_backoff(Duration::from_millis(1), 2),
        );
        let pipeline = Eduparse::new()
            .unwrap()
            .with_enricher(enricher)
            .with_cache(CacheConfig::new(dir.path()))
            .unwrap();

        let analysis = pipeline.analyze(WORKSHEET, Some("txt")).unwrap();
        assert!(analysis.incomplete);
        assert_eq!(analysis.questions.len(), 2);
        assert!(pipeline.cache().unwrap().is_empty());
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let pipeline = Eduparse::new().unwrap();
        let results = pipeline.analyze_batch(vec![
            (b"1. First?\n2. Second?\n".to_vec(), Some("txt".into())),
            (vec![0x00, 0xFF, 0x13, 0x37], None),
            (b"Just notes.".to_vec(), None),
        ]);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().questions.len(), 2);
        assert!(matches!(results[1], Err(Error::UnsupportedFormat(_))));
        assert!(results[2].as_ref().unwrap().questions.is_empty());
    }

    #[test]
    fn test_analyze_mixed_with_custom_image_analyzer() {
        let pipeline = Eduparse::new()
            .unwrap()
            .with_image_analyzer(Arc::new(TagImages))
            .with_fusion_options(FusionOptions {
                parallel: false,
                ..FusionOptions::default()
            });

        let mut images = BTreeMap::new();
        images.insert("1".to_string(), b"photosynthesis chlorophyll".to_vec());
        let text = "Photosynthesis needs chlorophyll, see Figure 1.\n\nUnrelated closing remarks.";
        let combined = pipeline.analyze_mixed(text, &images);

        assert_eq!(combined.content_blocks.len(), 1);
        assert!(combined.content_blocks[0]
            .integrated_concepts
            .contains("photosynthesis"));
    }
}

//! Optional AI enrichment.
//!
//! A provider receives normalized text and a structural summary, never raw
//! bytes. Calls run on a worker thread with a timeout and bounded retries;
//! when every attempt fails the structural analysis is kept and marked
//! incomplete.

mod prompt;

pub use prompt::{build_prompt, parse_response, truncate_chars, AnalysisDepth};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{DocumentAnalysis, DocumentType, Enrichment};

/// Structural facts sent alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub headings: Vec<String>,
    pub question_count: usize,
    pub table_count: usize,
    pub figure_count: usize,
    pub learning_objectives: Vec<String>,
}

/// Input handed to an enrichment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub document_type: DocumentType,
    pub depth: AnalysisDepth,
    pub prompt: String,
    /// Normalized text, truncated
    pub text: String,
    pub structure: StructureSummary,
}

impl EnrichmentRequest {
    /// Build the request for an analysis.
    pub fn from_analysis(analysis: &DocumentAnalysis, options: &EnrichmentOptions) -> Self {
        let limit = options.max_text_chars.min(options.depth.text_limit());
        let doc = &analysis.document;
        Self {
            document_type: analysis.document_type,
            depth: options.depth,
            prompt: build_prompt(analysis.document_type, options.depth),
            text: truncate_chars(&doc.raw_text, limit).to_string(),
            structure: StructureSummary {
                headings: doc.headings.iter().map(|h| h.text.clone()).collect(),
                question_count: analysis.questions.len(),
                table_count: doc.tables.len(),
                figure_count: doc.figures.len(),
                learning_objectives: analysis.learning_objectives.clone(),
            },
        }
    }
}

/// A semantic annotation service (an LLM behind an API, usually).
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Produce annotations. May block; the caller enforces the timeout.
    fn enrich(&self, request: &EnrichmentRequest) -> Result<Enrichment>;
}

/// Timeout and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentOptions {
    /// Per-attempt timeout in milliseconds (default 30000)
    pub timeout_ms: u64,
    /// Attempts before giving up (default 3)
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds (default 200)
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt (default 2)
    pub backoff_factor: u32,
    /// Upper bound on characters of text sent (default 4000)
    pub max_text_chars: usize,
    pub depth: AnalysisDepth,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            initial_backoff_ms: 200,
            backoff_factor: 2,
            max_text_chars: 4000,
            depth: AnalysisDepth::Standard,
        }
    }
}

impl EnrichmentOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, factor: u32) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.backoff_factor = factor.max(1);
        self
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Delay before attempt `attempt` (1-based; the first attempt has none).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = u64::from(self.backoff_factor.max(1)).saturating_pow(attempt - 2);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

/// Runs a provider with timeout and retries.
pub struct Enricher {
    provider: Arc<dyn EnrichmentProvider>,
    options: EnrichmentOptions,
}

impl Enricher {
    pub fn new(provider: Arc<dyn EnrichmentProvider>) -> Self {
        Self {
            provider,
            options: EnrichmentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EnrichmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EnrichmentOptions {
        &self.options
    }

    /// Call the provider, retrying with exponential backoff.
    pub fn enrich(&self, request: EnrichmentRequest) -> Result<Enrichment> {
        let request = Arc::new(request);
        let timeout = Duration::from_millis(self.options.timeout_ms);
        let attempts = self.options.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let delay = self.options.backoff(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            match self.attempt(&request, timeout) {
                Ok(enrichment) => {
                    log::debug!("{} enrichment succeeded on attempt {}", self.provider.name(), attempt);
                    return Ok(enrichment);
                }
                Err(reason) => {
                    log::warn!(
                        "{} enrichment attempt {}/{} failed: {}",
                        self.provider.name(),
                        attempt,
                        attempts,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(Error::EnrichmentUnavailable(format!(
            "{} after {} attempt(s): {}",
            self.provider.name(),
            attempts,
            last_error
        )))
    }

    /// One call on a worker thread. A timed-out worker is abandoned; its
    /// result is dropped when it eventually arrives.
    fn attempt(&self, request: &Arc<EnrichmentRequest>, timeout: Duration) -> std::result::Result<Enrichment, String> {
        let (tx, rx) = bounded(1);
        let provider = Arc::clone(&self.provider);
        let request = Arc::clone(request);

        thread::Builder::new()
            .name("eduparse-enrich".into())
            .spawn(move || {
                let _ = tx.send(provider.enrich(&request));
            })
            .map_err(|e| format!("could not spawn worker: {}", e))?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(enrichment)) => Ok(enrichment),
            Ok(Err(e)) => Err(e.to_string()),
            Err(RecvTimeoutError::Timeout) => Err(format!("timed out after {:?}", timeout)),
            Err(RecvTimeoutError::Disconnected) => Err("provider worker exited without a result".into()),
        }
    }

    /// Enrich an analysis in place.
    ///
    /// Returns `false` and marks the analysis incomplete when enrichment is
    /// unavailable; structural results are never touched.
    pub fn apply(&self, analysis: &mut DocumentAnalysis) -> bool {
        let request = EnrichmentRequest::from_analysis(analysis, &self.options);
        match self.enrich(request) {
            Ok(enrichment) => {
                analysis.merge_enrichment(enrichment);
                true
            }
            Err(e) => {
                log::warn!("{}", e);
                analysis.incomplete = true;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DocumentFormat;
    use crate::model::{NormalizedDocument, Question};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then succeeds; optionally sleeps per call.
    struct FlakyProvider {
        failures: u32,
        delay: Duration,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                failures,
                delay,
                calls: AtomicU32::new(0),
            })
        }
    }

    impl EnrichmentProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn enrich(&self, request: &EnrichmentRequest) -> Result<Enrichment> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if call < self.failures {
                return Err(Error::EnrichmentUnavailable("rate limited".into()));
            }
            Ok(Enrichment {
                summary: Some(format!("{} questions", request.structure.question_count)),
                key_concepts: vec!["Gravity".into()],
                ..Default::default()
            })
        }
    }

    fn fast_options() -> EnrichmentOptions {
        EnrichmentOptions::default()
            .with_timeout(Duration::from_millis(500))
            .with_backoff(Duration::from_millis(1), 2)
    }

    fn analysis() -> DocumentAnalysis {
        let mut document = NormalizedDocument::new(DocumentFormat::Text);
        document.raw_text = "1. Explain gravity.".into();
        DocumentAnalysis {
            fingerprint: "f".into(),
            format: DocumentFormat::Text,
            document,
            document_type: DocumentType::Worksheet,
            questions: vec![Question::new("1", "Explain gravity.")],
            learning_objectives: Vec::new(),
            concepts: vec!["explain".into()],
            enrichment: None,
            incomplete: false,
        }
    }

    #[test]
    fn test_retries_then_succeeds() {
        let provider = FlakyProvider::new(2, Duration::ZERO);
        let enricher = Enricher::new(provider.clone()).with_options(fast_options());

        let mut analysis = analysis();
        assert!(enricher.apply(&mut analysis));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(analysis.enrichment.unwrap().summary.as_deref(), Some("1 questions"));
        assert_eq!(analysis.concepts, vec!["explain", "gravity"]);
        assert_eq!(analysis.questions.len(), 1);
    }

    #[test]
    fn test_gives_up_and_marks_incomplete() {
        let provider = FlakyProvider::new(10, Duration::ZERO);
        let enricher = Enricher::new(provider.clone()).with_options(fast_options());

        let mut analysis = analysis();
        let before = analysis.clone();
        assert!(!enricher.apply(&mut analysis));
        assert!(analysis.incomplete);
        assert!(analysis.enrichment.is_none());
        assert_eq!(analysis.questions, before.questions);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_timeout() {
        let provider = FlakyProvider::new(0, Duration::from_millis(300));
        let options = fast_options()
            .with_timeout(Duration::from_millis(20))
            .with_max_attempts(1);
        let enricher = Enricher::new(provider).with_options(options);

        let err = enricher
            .enrich(EnrichmentRequest::from_analysis(&analysis(), &EnrichmentOptions::default()))
            .unwrap_err();
        assert!(matches!(err, Error::EnrichmentUnavailable(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_backoff_grows() {
        let options = EnrichmentOptions::default();
        assert_eq!(options.backoff(1), Duration::ZERO);
        assert_eq!(options.backoff(2), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(400));
        assert_eq!(options.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn test_request_is_truncated() {
        let mut analysis = analysis();
        analysis.document.raw_text = "x".repeat(10_000);
        let options = EnrichmentOptions::default().with_depth(AnalysisDepth::Basic);
        let request = EnrichmentRequest::from_analysis(&analysis, &options);
        assert_eq!(request.text.len(), 2000);
        assert_eq!(request.structure.question_count, 1);
    }
}

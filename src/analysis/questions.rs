//! Question and option segmentation.

use std::sync::LazyLock;

use regex::Regex;

use super::patterns::PatternGroup;
use super::AnalysisOptions;
use crate::error::Result;
use crate::model::{Question, QuestionOption, QuestionType};

static BLANK_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_{3,}|＿{2,}|\(\s*\)|（\s*）|\[\s*\]").expect("valid regex")
});

/// Scanner state.
#[derive(Debug)]
enum ScanState {
    /// No question open yet
    Idle,
    /// A question is collecting options and continuation lines
    Open(Question),
}

/// Line-oriented question analyzer.
///
/// Each line is checked against the question-start group first; option
/// patterns are only consulted while a question is open.
#[derive(Debug)]
pub struct QuestionAnalyzer {
    starts: PatternGroup,
    options: PatternGroup,
    essay_min_chars: usize,
}

impl QuestionAnalyzer {
    /// Analyzer with the built-in pattern groups.
    pub fn new(options: &AnalysisOptions) -> Result<Self> {
        Ok(Self::with_patterns(
            PatternGroup::question_starts()?,
            PatternGroup::options()?,
            options,
        ))
    }

    /// Analyzer with custom pattern groups.
    pub fn with_patterns(
        starts: PatternGroup,
        options: PatternGroup,
        analysis: &AnalysisOptions,
    ) -> Self {
        Self {
            starts,
            options,
            essay_min_chars: analysis.essay_min_chars,
        }
    }

    /// Segment text into questions in document order.
    pub fn analyze(&self, text: &str) -> Vec<Question> {
        let mut questions = Vec::new();
        let mut state = ScanState::Idle;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if let Some((pattern, m)) = self.starts.first_match(line) {
                if let ScanState::Open(done) = state {
                    questions.push(done);
                }
                log::trace!("question {} opened by {} pattern", m.label, pattern);
                state = ScanState::Open(Question::new(m.label, m.text));
                continue;
            }

            match &mut state {
                ScanState::Open(question) => match self.options.first_match(line) {
                    Some((_, m)) => question.add_option(QuestionOption::new(m.label, m.text)),
                    None => question.append_text(line),
                },
                ScanState::Idle => {
                    if self.options.first_match(line).is_some() {
                        log::debug!("option line before any question dropped: {}", line.trim());
                    }
                }
            }
        }

        if let ScanState::Open(done) = state {
            questions.push(done);
        }

        for question in &mut questions {
            if question.question_type == QuestionType::Unknown {
                let resolved = self.classify(question);
                question.set_type(resolved);
            }
        }

        questions
    }

    /// Secondary classification for questions without options.
    fn classify(&self, question: &Question) -> QuestionType {
        if !question.options.is_empty() {
            return QuestionType::MultipleChoice;
        }
        if BLANK_MARKER.is_match(&question.text) {
            QuestionType::FillInBlank
        } else if question.text.chars().count() > self.essay_min_chars {
            QuestionType::Essay
        } else {
            QuestionType::Unknown
        }
    }
}

/// Segment text with the default patterns and options.
pub fn extract_questions(text: &str) -> Result<Vec<Question>> {
    Ok(QuestionAnalyzer::new(&AnalysisOptions::default())?.analyze(text))
}

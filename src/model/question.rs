//! Question records produced by the question analyzer.

use serde::{Deserialize, Serialize};

/// Kind of question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    Unknown,
    MultipleChoice,
    FillInBlank,
    Essay,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Unknown => "unknown",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::Essay => "essay",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled answer choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub text: String,
}

impl QuestionOption {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// A question found in document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Marker as written (`1`, `一`, `12`)
    pub number: String,

    /// Question stem, continuation lines space-joined
    pub text: String,

    /// Answer choices in document order
    pub options: Vec<QuestionOption>,

    #[serde(rename = "type")]
    pub question_type: QuestionType,
}

impl Question {
    /// Open a new question with `unknown` type.
    pub fn new(number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            text: text.into().trim().to_string(),
            options: Vec::new(),
            question_type: QuestionType::Unknown,
        }
    }

    /// Append an option; the question becomes multiple choice.
    pub fn add_option(&mut self, option: QuestionOption) {
        self.options.push(option);
        self.question_type = QuestionType::MultipleChoice;
    }

    /// Append a continuation line to the stem.
    pub fn append_text(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(line);
    }

    /// Set the type unless that would break the option invariant.
    ///
    /// A question with options is always multiple choice; `essay` is refused.
    pub fn set_type(&mut self, question_type: QuestionType) -> bool {
        if !self.options.is_empty() && question_type != QuestionType::MultipleChoice {
            return false;
        }
        self.question_type = question_type;
        true
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.question_type == QuestionType::MultipleChoice
    }
}

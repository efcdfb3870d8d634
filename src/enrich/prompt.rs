//! Prompt construction and response parsing for enrichment providers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{DocumentType, Enrichment};

/// How much the provider is asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Basic,
    #[default]
    Standard,
    Deep,
}

impl AnalysisDepth {
    /// Characters of document text sent at this depth.
    pub fn text_limit(&self) -> usize {
        match self {
            AnalysisDepth::Basic => 2000,
            AnalysisDepth::Standard => 3500,
            AnalysisDepth::Deep => 4000,
        }
    }
}

impl std::str::FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(AnalysisDepth::Basic),
            "standard" => Ok(AnalysisDepth::Standard),
            "deep" => Ok(AnalysisDepth::Deep),
            other => Err(format!("unknown analysis depth '{}'", other)),
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the instruction text for a document.
pub fn build_prompt(document_type: DocumentType, depth: AnalysisDepth) -> String {
    let focus: &[&str] = match document_type {
        DocumentType::Syllabus => &[
            "basic course information (name, instructor, credits)",
            "learning objectives",
            "weekly topics",
            "assessment methods and grading criteria",
        ],
        DocumentType::Exam => &[
            "subject and scope of the exam",
            "question types and their point values",
            "overall difficulty",
        ],
        DocumentType::Worksheet => &[
            "topic and knowledge points practiced",
            "question types (multiple choice, fill in the blank, open ended)",
            "difficulty on a scale of 1 to 5",
        ],
        _ => &[
            "main subject and educational level",
            "key concepts and terminology",
            "main learning objectives",
        ],
    };

    let mut prompt = format!(
        "You are reviewing a {} for a teacher. Analyze it at {} depth.\nFocus on:\n",
        document_type.as_str().replace('_', " "),
        match depth {
            AnalysisDepth::Basic => "basic",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
        }
    );
    for (i, item) in focus.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item));
    }
    if depth == AnalysisDepth::Deep {
        prompt.push_str("Also classify the content by Bloom's taxonomy and suggest concrete improvements.\n");
    }
    prompt.push_str(
        "Reply with a JSON object with the fields summary, key_concepts (array), \
         difficulty and suggested_activities (array). Extra fields are allowed.",
    );
    prompt
}

/// Interpret a provider reply.
///
/// JSON objects are mapped onto [`Enrichment`] fields; unknown fields are kept
/// in `extra`. Anything else becomes the summary.
pub fn parse_response(reply: &str) -> Enrichment {
    let body = reply.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .and_then(|b| b.strip_suffix("```"))
        .unwrap_or(body)
        .trim();

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return Enrichment {
            summary: (!body.is_empty()).then(|| body.to_string()),
            ..Default::default()
        };
    };

    let mut enrichment = Enrichment::default();
    let mut extra = BTreeMap::new();
    for (key, value) in map {
        match key.as_str() {
            "summary" | "main_topic" | "subject_matter" => {
                if enrichment.summary.is_none() {
                    enrichment.summary = as_text(&value);
                }
            }
            "key_concepts" | "knowledge_points" | "key_points" => {
                enrichment.key_concepts.extend(as_list(&value));
            }
            "difficulty" | "difficulty_level" | "educational_level" => {
                if enrichment.difficulty.is_none() {
                    enrichment.difficulty = as_text(&value);
                }
            }
            "suggested_activities" | "recommendations" => {
                enrichment.suggested_activities.extend(as_list(&value));
            }
            _ => {
                extra.insert(key, value);
            }
        }
    }
    enrichment.extra = extra;
    enrichment
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        other => as_text(other).into_iter().collect(),
    }
}

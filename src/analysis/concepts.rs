//! Concept extraction.

use std::collections::{BTreeSet, HashMap};

use crate::model::is_cjk;

/// Extracts key concepts from text.
///
/// Concepts are lower-cased so text and image concepts compare directly.
pub trait ConceptExtractor: Send + Sync {
    /// Concepts ranked by importance, most important first.
    fn extract(&self, text: &str) -> Vec<String>;

    /// Concepts as a set.
    fn extract_set(&self, text: &str) -> BTreeSet<String> {
        self.extract(text).into_iter().collect()
    }
}

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "between", "both", "but", "can", "could", "did", "does", "each", "few",
    "for", "from", "had", "has", "have", "her", "here", "his", "how", "into", "its", "more",
    "most", "not", "now", "only", "other", "our", "out", "over", "same", "she", "should", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "too", "under", "until", "very", "was", "were", "what", "when", "where",
    "which", "while", "who", "why", "will", "with", "would", "you", "your", "figure", "fig",
    "page", "see", "use", "used", "using", "one", "two", "three",
];

/// Characters that split CJK runs into terms.
const CJK_BREAKS: &[char] = &[
    '的', '是', '和', '與', '及', '在', '了', '有', '為', '也', '就', '都', '而', '或', '並',
    '之', '其', '這', '那', '個', '中', '上', '下', '由', '把', '被', '對', '從', '如', '圖',
];

/// Frequency-ranked keyword extraction.
///
/// Latin tokens are alphanumeric runs of at least `min_len` characters that
/// are not stopwords. CJK runs are split at common function characters and
/// kept when two to six characters long. Ties rank lexically.
#[derive(Debug, Clone)]
pub struct KeywordConceptExtractor {
    min_len: usize,
    max_concepts: usize,
}

impl Default for KeywordConceptExtractor {
    fn default() -> Self {
        Self::new(3, 20)
    }
}

impl KeywordConceptExtractor {
    pub fn new(min_len: usize, max_concepts: usize) -> Self {
        Self {
            min_len: min_len.max(1),
            max_concepts,
        }
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut latin = String::new();
        let mut cjk = String::new();

        let flush_latin = |word: &mut String, tokens: &mut Vec<String>| {
            if word.chars().count() >= self.min_len
                && !word.chars().all(|c| c.is_ascii_digit())
                && !STOPWORDS.contains(&word.as_str())
            {
                tokens.push(word.clone());
            }
            word.clear();
        };
        let flush_cjk = |run: &mut String, tokens: &mut Vec<String>| {
            let len = run.chars().count();
            if (2..=6).contains(&len) {
                tokens.push(run.clone());
            }
            run.clear();
        };

        for c in text.chars() {
            if is_cjk(c) && !CJK_BREAKS.contains(&c) {
                flush_latin(&mut latin, &mut tokens);
                cjk.push(c);
            } else if c.is_alphanumeric() && !is_cjk(c) {
                flush_cjk(&mut cjk, &mut tokens);
                latin.extend(c.to_lowercase());
            } else {
                flush_latin(&mut latin, &mut tokens);
                flush_cjk(&mut cjk, &mut tokens);
            }
        }
        flush_latin(&mut latin, &mut tokens);
        flush_cjk(&mut cjk, &mut tokens);

        tokens
    }
}

impl ConceptExtractor for KeywordConceptExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in self.tokens(text) {
            *counts.entry(token).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.max_concepts)
            .map(|(term, _)| term)
            .collect()
    }
}

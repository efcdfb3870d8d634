//! Ordered line pattern matchers.
//!
//! A [`PatternGroup`] tries its patterns in declaration order and the first
//! match wins. The question analyzer holds one group for question starts and
//! one for answer options.

use regex::Regex;

use crate::error::{Error, Result};

/// A marker found at the start of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// Marker label (`1`, `一`, `A`)
    pub label: String,
    /// Remaining text on the line, trimmed
    pub text: String,
}

/// Something that recognizes a marker at the start of a line.
pub trait LinePattern: Send + Sync {
    /// Pattern name used in logs.
    fn name(&self) -> &str;

    /// Match a single line.
    fn match_line(&self, line: &str) -> Option<LineMatch>;
}

/// A regex pattern with the label in group 1 and the remainder in group 2.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    name: String,
    regex: Regex,
    normalize_label: fn(&str) -> String,
}

impl RegexPattern {
    /// Compile a pattern. The regex must have two capture groups.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidOptions(format!("pattern: {}", e)))?;
        if regex.captures_len() < 3 {
            return Err(Error::InvalidOptions(format!(
                "pattern '{}' needs a label group and a text group",
                pattern
            )));
        }

        Ok(Self {
            name: name.into(),
            regex,
            normalize_label: str::to_string,
        })
    }

    /// Post-process the captured label (e.g. fold fullwidth letters).
    pub fn with_label_normalizer(mut self, normalize: fn(&str) -> String) -> Self {
        self.normalize_label = normalize;
        self
    }
}

impl LinePattern for RegexPattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn match_line(&self, line: &str) -> Option<LineMatch> {
        let caps = self.regex.captures(line)?;
        let label = caps.get(1)?.as_str();
        let text = caps.get(2).map_or("", |m| m.as_str());
        Some(LineMatch {
            label: (self.normalize_label)(label),
            text: text.trim().to_string(),
        })
    }
}

/// Ordered list of patterns; the first match wins.
#[derive(Default)]
pub struct PatternGroup {
    patterns: Vec<Box<dyn LinePattern>>,
}

impl PatternGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern with the lowest priority so far.
    pub fn with(mut self, pattern: impl LinePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    /// Append a pattern with the lowest priority so far.
    pub fn push(&mut self, pattern: Box<dyn LinePattern>) {
        self.patterns.push(pattern);
    }

    /// First matching pattern and its match.
    pub fn first_match(&self, line: &str) -> Option<(&str, LineMatch)> {
        self.patterns
            .iter()
            .find_map(|p| p.match_line(line).map(|m| (p.name(), m)))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Question-start markers: `1.` / `1)` / `1。`, CJK numerals, `第1題`.
    pub fn question_starts() -> Result<Self> {
        Ok(Self::new()
            .with(RegexPattern::new(
                "arabic",
                r"^\s*(\d{1,3})(?:[.)．]\s+|[.)．]$|[。、]\s*)(.*)$",
            )?)
            .with(RegexPattern::new(
                "cjk-numeral",
                r"^\s*([一二三四五六七八九十百]+)[.)．。、]\s*(.*)$",
            )?)
            .with(RegexPattern::new(
                "explicit",
                r"^\s*第\s*(\d+|[一二三四五六七八九十百]+)\s*題\s*[:：.、]?\s*(.*)$",
            )?))
    }

    /// Option markers: `A.`, `（A）`, `(A)`.
    pub fn options() -> Result<Self> {
        Ok(Self::new()
            .with(RegexPattern::new("latin-dot", r"^\s*([A-Z])(?:[.．]\s+|、\s*)(.*)$")?)
            .with(
                RegexPattern::new("fullwidth-paren", r"^\s*（([A-ZＡ-Ｚ])）\s*(.*)$")?
                    .with_label_normalizer(fold_fullwidth),
            )
            .with(RegexPattern::new("paren", r"^\s*\(([A-Z])\)\s*(.*)$")?))
    }
}

impl std::fmt::Debug for PatternGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.patterns.iter().map(|p| p.name()))
            .finish()
    }
}

/// Fold fullwidth Latin letters (`Ａ`) to ASCII.
fn fold_fullwidth(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            'Ａ'..='Ｚ' => char::from_u32(c as u32 - 0xFF21 + 'A' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_start_forms() {
        let group = PatternGroup::question_starts().unwrap();

        let (name, m) = group.first_match("1. What is 2+2?").unwrap();
        assert_eq!((name, m.label.as_str(), m.text.as_str()), ("arabic", "1", "What is 2+2?"));

        let (_, m) = group.first_match("12) Name the capital").unwrap();
        assert_eq!(m.label, "12");

        let (_, m) = group.first_match("3。光合作用是什麼？").unwrap();
        assert_eq!(m.text, "光合作用是什麼？");

        let (name, m) = group.first_match("二、請說明水循環").unwrap();
        assert_eq!((name, m.label.as_str()), ("cjk-numeral", "二"));

        let (name, m) = group.first_match("第3題：計算面積").unwrap();
        assert_eq!((name, m.label.as_str(), m.text.as_str()), ("explicit", "3", "計算面積"));
    }

    #[test]
    fn test_non_markers() {
        let group = PatternGroup::question_starts().unwrap();
        assert!(group.first_match("1.5 grams of salt").is_none());
        assert!(group.first_match("In 1990 the wall fell.").is_none());
        assert!(group.first_match("").is_none());
    }

    #[test]
    fn test_option_forms() {
        let group = PatternGroup::options().unwrap();
        assert_eq!(group.first_match("A. 3").unwrap().1, LineMatch {
            label: "A".into(),
            text: "3".into(),
        });
        assert_eq!(group.first_match("（Ｂ）細胞").unwrap().1.label, "B");
        assert_eq!(group.first_match("(C) mitochondria").unwrap().0, "paren");
        assert!(group.first_match("Also consider this").is_none());
    }

    #[test]
    fn test_first_declared_pattern_wins() {
        let group = PatternGroup::new()
            .with(RegexPattern::new("broad", r"^(\w+)\s*(.*)$").unwrap())
            .with(RegexPattern::new("narrow", r"^(\d+)\.\s*(.*)$").unwrap());
        assert_eq!(group.first_match("1. x").unwrap().0, "broad");
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_pattern_needs_groups() {
        assert!(RegexPattern::new("bad", r"^\d+").is_err());
        assert!(RegexPattern::new("bad", r"(").is_err());
    }
}

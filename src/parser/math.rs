//! Math region detection by operator/symbol density.

use crate::model::Span;
use crate::parser::Thresholds;

/// Characters that only occur in mathematical notation.
fn is_strong_symbol(c: char) -> bool {
    matches!(
        c,
        '=' | '+'
            | '×'
            | '÷'
            | '^'
            | '√'
            | '∑'
            | '∏'
            | '∫'
            | '∂'
            | '∇'
            | '≤'
            | '≥'
            | '≠'
            | '≈'
            | '≡'
            | '±'
            | '∞'
            | '∈'
            | '∉'
            | '⊂'
            | '⊆'
            | '∪'
            | '∩'
            | '→'
            | '⇒'
            | '°'
            | '²'
            | '³'
            | '½'
            | '¼'
            | '¾'
    ) || ('\u{0391}'..='\u{03C9}').contains(&c)
        || ('\u{2200}'..='\u{22FF}').contains(&c)
}

/// Characters that count toward density but do not mark math by themselves.
fn is_weak_symbol(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | '−' | '*' | '/' | '<' | '>' | '(' | ')' | '|' | '.')
}

/// Whether one line of text looks like mathematical notation.
pub fn is_math_line(line: &str, thresholds: &Thresholds) -> bool {
    let mut total = 0usize;
    let mut strong = 0usize;
    let mut weak = 0usize;

    for c in line.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_strong_symbol(c) {
            strong += 1;
        } else if is_weak_symbol(c) {
            weak += 1;
        }
    }

    if total == 0 || strong == 0 {
        return false;
    }
    let symbols = strong + weak;
    symbols >= thresholds.math_min_chars
        && symbols as f32 / total as f32 >= thresholds.math_symbol_density
}

/// Byte ranges of `text` covering runs of adjacent math lines.
pub fn detect_math_regions(text: &str, thresholds: &Thresholds) -> Vec<Span> {
    let mut regions: Vec<Span> = Vec::new();
    let mut open: Option<Span> = None;
    let mut offset = 0;

    for raw_line in text.split_inclusive('\n') {
        let line = raw_line.trim_end_matches(['\n', '\r']);
        let leading = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        let start = offset + leading;
        let end = start + trimmed.len();
        offset += raw_line.len();

        if trimmed.is_empty() {
            regions.extend(open.take());
            continue;
        }

        if is_math_line(trimmed, thresholds) {
            open = Some(match open {
                Some(span) => Span::new(span.start, end),
                None => Span::new(start, end),
            });
        } else {
            regions.extend(open.take());
        }
    }
    regions.extend(open);

    if !regions.is_empty() {
        log::debug!("math: {} region(s)", regions.len());
    }
    regions
}

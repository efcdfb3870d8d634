//! Text cleanup for extracted PDF and OCR text.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z])-[ \t]*\n[ \t]*([a-z])").expect("valid regex"));
static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]{2,}").expect("valid regex"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Cleanup steps applied to extracted text.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Normalize Unicode to NFC form
    pub normalize_unicode: bool,
    /// Expand typographic ligatures
    pub fix_ligatures: bool,
    /// Join words hyphenated across line breaks
    pub fix_hyphenation: bool,
    /// Remove U+FFFD left by failed glyph decoding
    pub remove_replacement_char: bool,
    /// Collapse space runs and excess blank lines
    pub normalize_whitespace: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            fix_ligatures: true,
            fix_hyphenation: true,
            remove_replacement_char: true,
            normalize_whitespace: true,
        }
    }
}

/// Text cleanup pipeline.
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    options: CleanupOptions,
}

impl TextCleaner {
    pub fn new(options: CleanupOptions) -> Self {
        Self { options }
    }

    /// Run every enabled step.
    pub fn clean(&self, text: &str) -> String {
        let mut out = if self.options.normalize_unicode {
            text.nfc().collect::<String>()
        } else {
            text.to_string()
        };

        if self.options.fix_ligatures && out.chars().any(|c| ('\u{FB00}'..='\u{FB06}').contains(&c)) {
            out = expand_ligatures(&out);
        }

        if self.options.remove_replacement_char {
            out.retain(|c| c != '\u{FFFD}');
        }

        if self.options.fix_hyphenation {
            out = HYPHEN_BREAK.replace_all(&out, "$1$2").into_owned();
        }

        if self.options.normalize_whitespace {
            out = out.replace("\r\n", "\n").replace('\r', "\n");
            out = SPACE_RUNS.replace_all(&out, " ").into_owned();
            out = out
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n");
            out = BLANK_RUNS.replace_all(&out, "\n\n").into_owned();
        }

        out.trim().to_string()
    }
}

/// Clean text with the default steps.
pub fn clean_text(text: &str) -> String {
    TextCleaner::default().clean(text)
}

fn expand_ligatures(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, expanded)) => out.push_str(expanded),
            None => out.push(c),
        }
    }
    out
}

//! Document-level types.

use super::{FigureRef, TableBlock};
use crate::detect::DocumentFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format-agnostic text plus structure produced by a format parser.
///
/// A document is built once per source file and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Source format
    pub format: DocumentFormat,

    /// Document metadata (title, author, dimensions, etc.)
    pub metadata: Metadata,

    /// Full text in reading order; paragraphs are separated by blank lines
    pub raw_text: String,

    /// Headings in document order
    pub headings: Vec<Heading>,

    /// Paragraphs in document order
    pub paragraphs: Vec<String>,

    /// Extracted tables
    pub tables: Vec<TableBlock>,

    /// Embedded or referenced figures
    pub figures: Vec<FigureRef>,

    /// Byte ranges of `raw_text` that look like mathematical notation
    pub math_regions: Vec<Span>,

    /// Heading hierarchy with paragraphs and tables attached
    pub outline: Outline,

    /// Non-fatal extraction problems
    pub warnings: Vec<ExtractionWarning>,
}

impl NormalizedDocument {
    /// Create a new empty document.
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            metadata: Metadata::default(),
            raw_text: String::new(),
            headings: Vec::new(),
            paragraphs: Vec::new(),
            tables: Vec::new(),
            figures: Vec::new(),
            math_regions: Vec::new(),
            outline: Outline::new(),
            warnings: Vec::new(),
        }
    }

    /// Check if the document has no text and no structure.
    pub fn is_empty(&self) -> bool {
        self.raw_text.trim().is_empty() && self.tables.is_empty() && self.figures.is_empty()
    }

    /// Get plain text content of the entire document.
    pub fn plain_text(&self) -> &str {
        &self.raw_text
    }

    /// Number of whitespace-separated words, counting each CJK character as one word.
    pub fn word_count(&self) -> usize {
        count_words(&self.raw_text)
    }

    /// Slice of `raw_text` covered by a math region.
    pub fn math_text(&self, span: &Span) -> Option<&str> {
        self.raw_text.get(span.start..span.end)
    }

    /// Whether extraction degraded somewhere.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Count words the way reading-time estimates expect for mixed scripts.
pub fn count_words(text: &str) -> usize {
    let mut count = 0;
    for token in text.split_whitespace() {
        let cjk = token.chars().filter(|c| is_cjk(*c)).count();
        let rest = token.chars().any(|c| c.is_alphanumeric() && !is_cjk(c));
        count += cjk + usize::from(rest);
    }
    count
}

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

/// A heading with its level (1 = top).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    /// Page number (1-indexed) when the source is paginated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Heading {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self {
            level: level.clamp(1, 6),
            text: text.into(),
            page: None,
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Half-open byte range `[start, end)` into `raw_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,

    /// Number of pages, when the format is paginated
    pub page_count: Option<u32>,

    /// Estimated printed pages for flowing formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_pages: Option<f32>,

    /// Language used for OCR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Pixel width for raster sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Pixel height for raster sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Raster encoding (png, jpeg, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_format: Option<String>,
}

impl Metadata {
    /// Title, falling back to the first heading of the document.
    pub fn display_title<'a>(&'a self, doc: &'a NormalizedDocument) -> &'a str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| doc.headings.first().map(|h| h.text.as_str()))
            .unwrap_or("Untitled")
    }
}

/// Non-fatal extraction conditions, surfaced on the result instead of raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// Every table candidate for a region fell below the quality threshold.
    LowQualityTable { page: Option<u32>, confidence: f32 },
    /// Structural extraction failed for a page; only plain text was recovered.
    TextOnlyFallback { page: u32, reason: String },
    /// A page could not be read at all.
    PageSkipped { page: u32, reason: String },
    /// Very little text although the document contains images (scanned PDF).
    MissingTextLayer { chars: usize },
    /// Math notation was suspected but no math-aware OCR mode was available.
    MathOcrUnavailable,
    /// OCR produced less text than expected.
    LimitedOcrText { chars: usize },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionWarning::LowQualityTable { page, confidence } => match page {
                Some(p) => write!(f, "low-quality table on page {} (confidence {:.2})", p, confidence),
                None => write!(f, "low-quality table (confidence {:.2})", confidence),
            },
            ExtractionWarning::TextOnlyFallback { page, reason } => {
                write!(f, "page {}: text-only fallback ({})", page, reason)
            }
            ExtractionWarning::PageSkipped { page, reason } => {
                write!(f, "page {} skipped ({})", page, reason)
            }
            ExtractionWarning::MissingTextLayer { chars } => {
                write!(f, "only {} characters of text; document may be scanned", chars)
            }
            ExtractionWarning::MathOcrUnavailable => {
                write!(f, "math notation suspected but math OCR mode unavailable")
            }
            ExtractionWarning::LimitedOcrText { chars } => {
                write!(f, "OCR recovered only {} characters", chars)
            }
        }
    }
}

/// Heading hierarchy of a document.
///
/// Paragraphs that appear before the first heading are kept in `preamble`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    /// Paragraph indices before the first heading
    pub preamble: Vec<usize>,

    /// Top-level outline items
    pub items: Vec<OutlineItem>,
}

impl Outline {
    /// Create a new empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the outline is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.preamble.is_empty()
    }

    /// Get the total number of items (including nested).
    pub fn total_items(&self) -> usize {
        fn count_items(items: &[OutlineItem]) -> usize {
            items
                .iter()
                .map(|item| 1 + count_items(&item.children))
                .sum()
        }
        count_items(&self.items)
    }

    /// Depth of the deepest item (0 when empty).
    pub fn depth(&self) -> usize {
        fn depth_of(items: &[OutlineItem]) -> usize {
            items
                .iter()
                .map(|item| 1 + depth_of(&item.children))
                .max()
                .unwrap_or(0)
        }
        depth_of(&self.items)
    }
}

/// A heading together with the content nested under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineItem {
    /// Index into `NormalizedDocument::headings`
    pub heading: usize,

    /// Heading text
    pub title: String,

    /// Heading level (1 = top)
    pub level: u8,

    /// Paragraph indices directly under this heading
    pub paragraphs: Vec<usize>,

    /// Table indices directly under this heading
    pub tables: Vec<usize>,

    /// Child items
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    /// Create a new outline item.
    pub fn new(heading: usize, title: impl Into<String>, level: u8) -> Self {
        Self {
            heading,
            title: title.into(),
            level,
            paragraphs: Vec::new(),
            tables: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add a child item.
    pub fn add_child(&mut self, child: OutlineItem) {
        self.children.push(child);
    }
}

/// Incremental builder shared by all format parsers.
///
/// Content is pushed in reading order. The builder keeps `raw_text`,
/// the flat heading/paragraph/table lists and the outline in step.
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: NormalizedDocument,
    stack: Vec<OutlineItem>,
}

impl DocumentBuilder {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            doc: NormalizedDocument::new(format),
            stack: Vec::new(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.doc.metadata
    }

    pub fn warn(&mut self, warning: ExtractionWarning) {
        log::warn!("{}", warning);
        self.doc.warnings.push(warning);
    }

    /// Push a heading. Open headings of the same or deeper level are closed.
    pub fn push_heading(&mut self, heading: Heading) {
        let text = heading.text.trim().to_string();
        if text.is_empty() {
            return;
        }

        while self.stack.last().is_some_and(|top| top.level >= heading.level) {
            self.close_top();
        }

        let index = self.doc.headings.len();
        self.stack.push(OutlineItem::new(index, text.clone(), heading.level));
        self.append_text(&text);
        self.doc.headings.push(Heading { text, ..heading });
    }

    /// Push a paragraph under the most recent open heading.
    pub fn push_paragraph(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return;
        }

        let index = self.doc.paragraphs.len();
        match self.stack.last_mut() {
            Some(top) => top.paragraphs.push(index),
            None => self.doc.outline.preamble.push(index),
        }
        self.append_text(text);
        self.doc.paragraphs.push(text.to_string());
    }

    /// Push a table; its rows are also written to `raw_text`.
    pub fn push_table(&mut self, table: TableBlock) {
        let index = self.doc.tables.len();
        if let Some(top) = self.stack.last_mut() {
            top.tables.push(index);
        }
        let text = table.plain_text();
        if !text.trim().is_empty() {
            self.append_text(&text);
        }
        self.doc.tables.push(table);
    }

    pub fn push_figure(&mut self, figure: FigureRef) {
        self.doc.figures.push(figure);
    }

    /// Number of paragraphs pushed so far.
    pub fn paragraph_count(&self) -> usize {
        self.doc.paragraphs.len()
    }

    /// Text of the most recent paragraph.
    pub fn last_paragraph(&self) -> Option<&str> {
        self.doc.paragraphs.last().map(String::as_str)
    }

    /// Current length of the assembled text.
    pub fn text_len(&self) -> usize {
        self.doc.raw_text.len()
    }

    fn append_text(&mut self, text: &str) {
        if !self.doc.raw_text.is_empty() {
            self.doc.raw_text.push_str("\n\n");
        }
        self.doc.raw_text.push_str(text);
    }

    fn close_top(&mut self) {
        if let Some(item) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.add_child(item),
                None => self.doc.outline.items.push(item),
            }
        }
    }

    /// Replace the assembled text, e.g. to keep a plain-text source verbatim.
    pub fn set_raw_text(&mut self, text: String) {
        self.doc.raw_text = text;
    }

    /// Close all open headings and return the document.
    pub fn finish(mut self, math_regions: impl FnOnce(&str) -> Vec<Span>) -> NormalizedDocument {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.doc.math_regions = math_regions(&self.doc.raw_text);
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(items: &[(&str, u8)]) -> NormalizedDocument {
        let mut builder = DocumentBuilder::new(DocumentFormat::Docx);
        for (text, level) in items {
            if *level == 0 {
                builder.push_paragraph(*text);
            } else {
                builder.push_heading(Heading::new(*level, *text));
            }
        }
        builder.finish(|_| Vec::new())
    }

    #[test]
    fn test_document_new() {
        let doc = NormalizedDocument::new(DocumentFormat::Text);
        assert!(doc.is_empty());
        assert!(doc.outline.is_empty());
    }

    #[test]
    fn test_outline_sibling_and_child() {
        let doc = build(&[("Chapter 1", 1), ("Section 1.1", 2), ("Chapter 2", 1)]);
        assert_eq!(doc.outline.items.len(), 2);
        assert_eq!(doc.outline.items[0].title, "Chapter 1");
        assert_eq!(doc.outline.items[0].children.len(), 1);
        assert_eq!(doc.outline.items[0].children[0].title, "Section 1.1");
        assert_eq!(doc.outline.items[1].title, "Chapter 2");
        assert!(doc.outline.items[1].children.is_empty());
        assert_eq!(doc.outline.total_items(), 3);
    }

    #[test]
    fn test_outline_paragraph_placement() {
        let doc = build(&[
            ("Intro text", 0),
            ("Unit", 1),
            ("Body A", 0),
            ("Lesson", 2),
            ("Body B", 0),
        ]);
        assert_eq!(doc.outline.preamble, vec![0]);
        assert_eq!(doc.outline.items[0].paragraphs, vec![1]);
        assert_eq!(doc.outline.items[0].children[0].paragraphs, vec![2]);
        assert_eq!(doc.outline.depth(), 2);
    }

    #[test]
    fn test_level_jump_nests_under_nearest_lower() {
        let doc = build(&[("A", 1), ("B", 3), ("C", 2)]);
        let a = &doc.outline.items[0];
        assert_eq!(a.children.len(), 2);
        assert_eq!(a.children[0].title, "B");
        assert_eq!(a.children[1].title, "C");
    }

    #[test]
    fn test_raw_text_joins_blocks() {
        let doc = build(&[("Title", 1), ("First.", 0), ("Second.", 0)]);
        assert_eq!(doc.raw_text, "Title\n\nFirst.\n\nSecond.");
        assert_eq!(doc.paragraphs, vec!["First.", "Second."]);
    }

    #[test]
    fn test_word_count_mixed_scripts() {
        assert_eq!(count_words("hello world"), 2);
        assert_eq!(count_words("光合作用 is fun"), 6);
    }
}

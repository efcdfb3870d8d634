//! Layout analysis for PDF pages.
//!
//! Turns positioned text spans into lines and blocks in reading order,
//! and classifies headings against the page's modal body-text metrics.

use std::collections::HashMap;

/// A text span with position and style information.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The text content
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline)
    pub y: f32,
    /// Width of the text
    pub width: f32,
    /// Font size in points
    pub font_size: f32,
    /// Font name (e.g., "Helvetica-Bold")
    pub font_name: String,
    /// Whether the font appears to be bold
    pub is_bold: bool,
    /// Whether the font appears to be italic
    pub is_italic: bool,
}

impl TextSpan {
    /// Create a new text span.
    pub fn new(text: String, x: f32, y: f32, font_size: f32, font_name: String) -> Self {
        let lower = font_name.to_lowercase();
        let is_bold = lower.contains("bold")
            || lower.contains("black")
            || lower.contains("heavy")
            || lower.contains("semibold");
        let is_italic = lower.contains("italic") || lower.contains("oblique");

        Self {
            text,
            x,
            y,
            width: 0.0,
            font_size,
            font_name,
            is_bold,
            is_italic,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Get the top Y coordinate (approximate, based on font size).
    pub fn top(&self) -> f32 {
        self.y + self.font_size * 0.8
    }

    fn weight(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

/// A text line composed of multiple spans on the same baseline.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// The spans in this line, sorted by X position
    pub spans: Vec<TextSpan>,
    /// Y position (baseline)
    pub y: f32,
    /// Leftmost X position
    pub x: f32,
    /// Dominant font size in this line
    pub font_size: f32,
    /// Detected heading level (1-6, or 0 for non-heading)
    pub heading_level: u8,
}

impl TextLine {
    /// Create a new text line from spans.
    pub fn from_spans(mut spans: Vec<TextSpan>) -> Self {
        spans.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

        let total: usize = spans.iter().map(TextSpan::weight).sum();
        let font_size = if total > 0 {
            spans
                .iter()
                .map(|s| s.font_size * s.weight() as f32)
                .sum::<f32>()
                / total as f32
        } else {
            spans.first().map(|s| s.font_size).unwrap_or(0.0)
        };

        Self {
            y: spans.first().map(|s| s.y).unwrap_or(0.0),
            x: spans.first().map(|s| s.x).unwrap_or(0.0),
            spans,
            font_size,
            heading_level: 0,
        }
    }

    pub fn is_heading(&self) -> bool {
        self.heading_level > 0
    }

    /// Get the combined text of all spans with appropriate spacing.
    ///
    /// Inserts spaces between spans based on their X coordinate gaps.
    /// No space is inserted between adjacent CJK characters.
    pub fn text(&self) -> String {
        let mut result = String::new();

        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 {
                let prev = &self.spans[i - 1];
                let gap = span.x - prev.right();

                let chars = span.text.chars().count();
                let avg_char_width = if chars > 0 && span.width > 0.0 {
                    span.width / chars as f32
                } else {
                    span.font_size * 0.5
                };

                let both_cjk = prev.text.chars().last().is_some_and(is_spaceless_script_char)
                    && span.text.chars().next().is_some_and(is_spaceless_script_char);
                let has_space = prev.text.ends_with([' ', '\u{00A0}'])
                    || span.text.starts_with([' ', '\u{00A0}']);

                if gap > avg_char_width * 0.2 && !both_cjk && !has_space {
                    result.push(' ');
                }
            }
            result.push_str(&span.text);
        }

        result
    }

    /// Check if the line is predominantly bold.
    pub fn is_bold(&self) -> bool {
        let bold: usize = self
            .spans
            .iter()
            .filter(|s| s.is_bold)
            .map(TextSpan::weight)
            .sum();
        let total: usize = self.spans.iter().map(TextSpan::weight).sum();
        total > 0 && bold as f32 / total as f32 > 0.5
    }
}

/// Type of text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// A heading (H1-H6)
    Heading,
    /// A regular paragraph
    Paragraph,
}

/// A text block (paragraph or heading).
#[derive(Debug, Clone)]
pub struct TextBlock {
    /// The lines in this block
    pub lines: Vec<TextLine>,
    /// Block type
    pub block_type: BlockType,
    /// Heading level (1-6 for headings, 0 otherwise)
    pub heading_level: u8,
}

impl TextBlock {
    fn from_lines(lines: Vec<TextLine>) -> Self {
        let heading_level = lines
            .iter()
            .filter(|l| l.is_heading())
            .map(|l| l.heading_level)
            .min()
            .unwrap_or(0);
        Self {
            block_type: if heading_level > 0 {
                BlockType::Heading
            } else {
                BlockType::Paragraph
            },
            lines,
            heading_level,
        }
    }

    /// Lines joined with newlines, preserving the visual line structure.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Baseline of the first line.
    pub fn top_y(&self) -> f32 {
        self.lines.first().map(|l| l.y).unwrap_or(0.0)
    }

    /// Check if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() || self.text().trim().is_empty()
    }
}

/// A detected column in the page layout.
#[derive(Debug, Clone)]
pub struct Column {
    /// Left boundary X coordinate
    pub left: f32,
    /// Right boundary X coordinate
    pub right: f32,
}

impl Column {
    /// Check if an X coordinate falls within this column.
    pub fn contains(&self, x: f32) -> bool {
        x >= self.left && x <= self.right
    }

    /// Check if a span belongs to this column by its left edge or center.
    pub fn contains_span(&self, span: &TextSpan) -> bool {
        let center = span.x + span.width / 2.0;
        self.contains(span.x) || self.contains(center)
    }
}

/// Font statistics for heading detection, computed per page.
#[derive(Debug, Clone)]
pub struct FontStatistics {
    /// Body text font size (most common, weighted by characters)
    pub body_size: f32,
    /// Whether body text is predominantly bold
    pub body_bold: bool,
    /// Font sizes that qualify as headings, largest first
    pub heading_sizes: Vec<f32>,
    /// Observed font sizes (0.1pt buckets) weighted by character count
    pub size_histogram: HashMap<i32, usize>,
    /// Size ratio over body text that marks a heading
    pub size_ratio: f32,
    bold_chars: usize,
    total_chars: usize,
}

impl Default for FontStatistics {
    fn default() -> Self {
        Self::with_ratio(1.15)
    }
}

impl FontStatistics {
    pub fn with_ratio(size_ratio: f32) -> Self {
        Self {
            body_size: 12.0,
            body_bold: false,
            heading_sizes: Vec::new(),
            size_histogram: HashMap::new(),
            size_ratio: size_ratio.max(1.0),
            bold_chars: 0,
            total_chars: 0,
        }
    }

    /// Add a span observation.
    pub fn add_span(&mut self, span: &TextSpan) {
        let weight = span.weight().max(1);
        let key = (span.font_size * 10.0).round() as i32;
        *self.size_histogram.entry(key).or_insert(0) += weight;
        self.total_chars += weight;
        if span.is_bold {
            self.bold_chars += weight;
        }
    }

    /// Calculate body size and heading sizes.
    pub fn analyze(&mut self) {
        let Some((&body_key, _)) = self
            .size_histogram
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        else {
            return;
        };
        self.body_size = body_key as f32 / 10.0;
        self.body_bold = self.total_chars > 0 && self.bold_chars * 2 > self.total_chars;

        let threshold = self.body_size * self.size_ratio;
        let mut larger: Vec<f32> = self
            .size_histogram
            .keys()
            .map(|k| *k as f32 / 10.0)
            .filter(|s| *s >= threshold)
            .collect();
        larger.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        self.heading_sizes = larger;
    }

    /// Get heading level for a line (1-6, or 0 for body text).
    ///
    /// Larger-than-body lines rank by size; short bold lines at body size
    /// count as the lowest heading level when body text is not bold.
    pub fn get_heading_level(&self, font_size: f32, is_bold: bool, text_len: usize) -> u8 {
        if font_size >= self.body_size * self.size_ratio {
            for (i, &size) in self.heading_sizes.iter().enumerate() {
                if font_size >= size - 0.5 {
                    return (i + 1).min(6) as u8;
                }
            }
            return (self.heading_sizes.len() + 1).min(6) as u8;
        }

        if is_bold && !self.body_bold && font_size >= self.body_size - 0.5 && text_len <= 80 {
            return (self.heading_sizes.len() + 1).min(6) as u8;
        }

        0
    }
}

/// Layout analyzer for one page.
pub struct LayoutAnalyzer {
    font_stats: FontStatistics,
}

impl LayoutAnalyzer {
    /// Create an analyzer using the given heading size ratio.
    pub fn new(heading_size_ratio: f32) -> Self {
        Self {
            font_stats: FontStatistics::with_ratio(heading_size_ratio),
        }
    }

    pub fn font_stats(&self) -> &FontStatistics {
        &self.font_stats
    }

    /// Learn font statistics from all spans of the page, including ones
    /// that later end up in tables.
    pub fn observe(&mut self, spans: &[TextSpan]) {
        for span in spans {
            self.font_stats.add_span(span);
        }
        self.font_stats.analyze();
    }

    /// Extract structured text blocks from spans.
    pub fn blocks(&self, spans: Vec<TextSpan>) -> Vec<TextBlock> {
        let lines = self.group_spans_into_lines(spans);
        let lines = self.detect_headings(lines);
        self.group_lines_into_blocks(lines)
    }

    /// Detect columns from the widest vertical gutter near the page center.
    fn detect_columns(&self, spans: &[TextSpan]) -> Vec<Column> {
        let min_x = spans.iter().map(|s| s.x).fold(f32::MAX, f32::min);
        let max_x = spans.iter().map(|s| s.right()).fold(f32::MIN, f32::max);
        let single = vec![Column {
            left: min_x - 10.0,
            right: max_x + 10.0,
        }];

        let page_width = max_x - min_x;
        if spans.is_empty() || page_width < 250.0 {
            return single;
        }

        let slice_width = 3.0;
        let slices = (page_width / slice_width) as usize + 1;
        let mut occupancy = vec![0usize; slices];
        for span in spans {
            let start = ((span.x - min_x) / slice_width) as usize;
            let end = ((span.right() - min_x) / slice_width) as usize;
            for slot in occupancy.iter_mut().take(end.min(slices - 1) + 1).skip(start) {
                *slot += 1;
            }
        }

        // Widest empty run in the middle 70% of the page.
        let (lo, hi) = (slices * 15 / 100, slices * 85 / 100);
        let mut best: Option<(usize, usize)> = None;
        let mut run_start = None;
        for i in lo..=hi.min(slices - 1) {
            let empty = occupancy[i] == 0 && i < hi;
            match (empty, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    let len = i - start;
                    if best.map_or(true, |(_, best_len)| len > best_len) {
                        best = Some((start, len));
                    }
                    run_start = None;
                }
                _ => {}
            }
        }

        let Some((gap_start, gap_len)) = best else {
            return single;
        };
        if gap_len as f32 * slice_width < 12.0 {
            log::debug!("gutter too narrow, single column");
            return single;
        }

        let gutter = min_x + (gap_start as f32 + gap_len as f32 / 2.0) * slice_width;
        if gutter - min_x < 80.0 || max_x - gutter < 80.0 {
            return single;
        }

        let left = spans.iter().filter(|s| s.x + s.width / 2.0 < gutter).count();
        let right = spans.len() - left;
        let min_spans = (spans.len() / 10).max(2);
        if left < min_spans || right < min_spans {
            return single;
        }

        log::debug!("two columns split at x={:.1}", gutter);
        vec![
            Column {
                left: min_x - 10.0,
                right: gutter,
            },
            Column {
                left: gutter,
                right: max_x + 10.0,
            },
        ]
    }

    /// Group spans into lines, reading each column top to bottom before the next.
    fn group_spans_into_lines(&self, spans: Vec<TextSpan>) -> Vec<TextLine> {
        if spans.is_empty() {
            return vec![];
        }

        let columns = self.detect_columns(&spans);
        if columns.len() <= 1 {
            return group_single_column(spans);
        }

        let mut per_column: Vec<Vec<TextSpan>> = vec![Vec::new(); columns.len()];
        for span in spans {
            let idx = columns
                .iter()
                .position(|c| c.contains_span(&span))
                .unwrap_or(0);
            per_column[idx].push(span);
        }

        per_column
            .into_iter()
            .flat_map(group_single_column)
            .collect()
    }

    /// Detect headings based on font size hierarchy and weight.
    fn detect_headings(&self, mut lines: Vec<TextLine>) -> Vec<TextLine> {
        for line in &mut lines {
            let text_len = line.text().chars().count();
            line.heading_level =
                self.font_stats
                    .get_heading_level(line.font_size, line.is_bold(), text_len);
        }
        lines
    }

    /// Group lines into blocks (paragraphs) based on spacing.
    fn group_lines_into_blocks(&self, lines: Vec<TextLine>) -> Vec<TextBlock> {
        let avg_spacing = average_line_spacing(&lines);
        let mut blocks: Vec<TextBlock> = Vec::new();
        let mut current: Vec<TextLine> = Vec::new();

        for line in lines {
            let should_break = current
                .last()
                .is_some_and(|prev| should_break_block(prev, &line, avg_spacing));
            if should_break {
                blocks.push(TextBlock::from_lines(std::mem::take(&mut current)));
            }
            current.push(line);
        }

        if !current.is_empty() {
            blocks.push(TextBlock::from_lines(current));
        }

        blocks.retain(|b| !b.is_empty());
        blocks
    }
}

/// Simple Y-based line grouping for single-column layout.
fn group_single_column(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    // PDF Y grows upward: sort top to bottom, then left to right.
    spans.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<TextLine> = Vec::new();
    let mut current: Vec<TextSpan> = Vec::new();
    let mut current_y: Option<f32> = None;

    for span in spans {
        let tolerance = span.font_size * 0.3;
        match current_y {
            Some(y) if (span.y - y).abs() <= tolerance => current.push(span),
            _ => {
                if !current.is_empty() {
                    lines.push(TextLine::from_spans(std::mem::take(&mut current)));
                }
                current_y = Some(span.y);
                current.push(span);
            }
        }
    }

    if !current.is_empty() {
        lines.push(TextLine::from_spans(current));
    }

    lines
}

fn average_line_spacing(lines: &[TextLine]) -> f32 {
    let spacings: Vec<f32> = lines
        .windows(2)
        .map(|w| (w[0].y - w[1].y).abs())
        .filter(|s| *s > 0.1)
        .collect();

    if spacings.is_empty() {
        return 12.0;
    }
    spacings.iter().sum::<f32>() / spacings.len() as f32
}

/// Determine if a new block should start.
fn should_break_block(prev: &TextLine, curr: &TextLine, avg_spacing: f32) -> bool {
    if curr.is_heading() || prev.is_heading() {
        return prev.heading_level != curr.heading_level || !curr.is_heading();
    }

    let spacing = prev.y - curr.y;
    // Moving up means a new column or a new region.
    if spacing < 0.0 || spacing > avg_spacing * 1.5 || spacing > curr.font_size * 2.5 {
        return true;
    }

    (prev.font_size - curr.font_size).abs() > 1.0 || (prev.x - curr.x).abs() > 20.0
}

/// Check if character is from a script that doesn't use word spaces.
/// Chinese and Japanese don't use spaces between words, but Korean does.
pub(crate) fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    // CJK Unified Ideographs and extensions
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2EBEF).contains(&code)
        // Hiragana, Katakana
        || (0x3040..=0x30FF).contains(&code)
        // CJK Symbols and Punctuation
        || (0x3000..=0x303F).contains(&code)
        // Fullwidth forms
        || (0xFF00..=0xFFEF).contains(&code)
}

//! Table detection from text positions (stream method).
//!
//! Tables are found by text alignment alone: spans are grouped into rows,
//! left edges that repeat across rows become column boundaries, and runs
//! of well-aligned rows become table regions. This is the fast method;
//! ruled tables are handled by [`super::lattice`].

use std::collections::{HashMap, HashSet};

use crate::model::{BoundingBox, TableBlock, TableMethod};
use crate::parser::Thresholds;

use super::layout::TextSpan;

/// A table found on a page, before it is placed into the document.
#[derive(Debug, Clone)]
pub struct TableCandidate {
    /// Cell text, row-major
    pub rows: Vec<Vec<String>>,
    /// Region covered by the table (PDF coordinates)
    pub bbox: BoundingBox,
    pub method: TableMethod,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Indices of the page spans consumed by the table
    pub spans: Vec<usize>,
}

impl TableCandidate {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Whether the candidate meets the configured quality bar.
    ///
    /// Low quality means too few rows or columns, or too many ragged rows.
    pub fn is_good(&self, thresholds: &Thresholds) -> bool {
        self.row_count() >= thresholds.table_min_rows
            && self.column_count() >= thresholds.table_min_cols
            && raggedness(&self.rows) <= thresholds.table_max_raggedness
    }

    /// Whether two candidates describe the same page region.
    pub fn same_region(&self, other: &TableCandidate) -> bool {
        self.bbox.overlaps(&other.bbox)
    }

    pub fn into_block(self, id: impl Into<String>, page: u32) -> TableBlock {
        TableBlock::new(id, self.rows, self.method)
            .with_page(page)
            .with_confidence(self.confidence)
            .with_bbox(self.bbox)
    }
}

/// Score a grid of cells: alignment quality, row regularity and fill.
pub(crate) fn table_confidence(rows: &[Vec<String>], alignment: f32) -> f32 {
    if rows.is_empty() {
        return 0.0;
    }
    let cells: usize = rows.iter().map(Vec::len).sum();
    let empty = rows
        .iter()
        .flatten()
        .filter(|c| c.trim().is_empty())
        .count();
    let fill = if cells == 0 {
        0.0
    } else {
        1.0 - empty as f32 / cells as f32
    };

    (alignment.clamp(0.0, 1.0) * 0.5 + (1.0 - raggedness(rows)) * 0.3 + fill * 0.2).clamp(0.0, 1.0)
}

/// Share of rows whose cell count differs from the widest row.
pub(crate) fn raggedness(rows: &[Vec<String>]) -> f32 {
    let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().filter(|r| r.len() != widest).count() as f32 / rows.len() as f32
}

/// Stream detector configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Minimum aligned rows for a region
    pub min_rows: usize,
    /// Minimum columns for a region
    pub min_columns: usize,
    /// Above this many columns the "table" is usually word-level splitting
    pub max_columns: usize,
    /// Y tolerance for grouping spans into rows (fraction of font size)
    pub y_tolerance_factor: f32,
    /// Share of multi-span rows that must share a left edge for it to be a column
    pub min_alignment_ratio: f32,
    /// Left edges closer than this are merged (points)
    pub min_column_gap: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 6,
            y_tolerance_factor: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
        }
    }
}

impl From<&Thresholds> for StreamConfig {
    fn from(thresholds: &Thresholds) -> Self {
        Self {
            min_column_gap: thresholds.table_column_gap,
            ..Self::default()
        }
    }
}

const ALIGN_TOLERANCE: f32 = 5.0;

#[derive(Debug, Clone)]
struct Row {
    y: f32,
    font_size: f32,
    /// Span indices sorted by x
    spans: Vec<usize>,
}

/// Detects borderless tables from span alignment.
#[derive(Debug, Default)]
pub struct StreamDetector {
    config: StreamConfig,
}

impl StreamDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Detect tables among the page spans.
    pub fn detect(&self, spans: &[TextSpan]) -> Vec<TableCandidate> {
        if spans.len() < self.config.min_rows * self.config.min_columns {
            return vec![];
        }

        let rows = self.group_into_rows(spans);
        if rows.len() < self.config.min_rows {
            return vec![];
        }

        let columns = self.detect_columns(spans, &rows);
        if columns.len() < self.config.min_columns {
            log::debug!("stream: {} column edges, no table", columns.len());
            return vec![];
        }

        let mut candidates = Vec::new();
        for (start, end) in self.find_table_regions(spans, &rows, &columns) {
            let region = &rows[start..=end];
            let region_columns = self.detect_columns(spans, region);

            if region_columns.len() < self.config.min_columns {
                continue;
            }
            if region_columns.len() > self.config.max_columns {
                log::debug!(
                    "stream: skipping region with {} columns",
                    region_columns.len()
                );
                continue;
            }
            if self.is_list_pattern(spans, region, &region_columns) {
                log::debug!("stream: skipping region that looks like a list");
                continue;
            }

            candidates.push(self.build_candidate(spans, region, &region_columns));
        }

        candidates
    }

    /// Group spans into rows by Y position, top to bottom.
    fn group_into_rows(&self, spans: &[TextSpan]) -> Vec<Row> {
        let mut order: Vec<usize> = (0..spans.len()).collect();
        order.sort_by(|&a, &b| {
            spans[b]
                .y
                .partial_cmp(&spans[a].y)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    spans[a]
                        .x
                        .partial_cmp(&spans[b].x)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let mut rows: Vec<Row> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_y: Option<f32> = None;

        for idx in order {
            let span = &spans[idx];
            let tolerance = span.font_size * self.config.y_tolerance_factor;
            match current_y {
                Some(y) if (span.y - y).abs() <= tolerance => current.push(idx),
                _ => {
                    if !current.is_empty() {
                        rows.push(make_row(spans, std::mem::take(&mut current)));
                    }
                    current_y = Some(span.y);
                    current.push(idx);
                }
            }
        }
        if !current.is_empty() {
            rows.push(make_row(spans, current));
        }

        rows
    }

    /// Left edges shared by enough multi-span rows, merged when closer than the column gap.
    fn detect_columns(&self, spans: &[TextSpan], rows: &[Row]) -> Vec<f32> {
        let multi: Vec<&Row> = rows.iter().filter(|r| r.spans.len() >= 2).collect();
        if multi.len() < self.config.min_rows {
            return vec![];
        }

        let bucket_size = 5.0;
        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for row in &multi {
            let buckets: HashSet<i32> = row
                .spans
                .iter()
                .map(|&i| (spans[i].x / bucket_size).round() as i32)
                .collect();
            for bucket in buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((multi.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);
        let mut edges: Vec<f32> = edge_counts
            .into_iter()
            .filter(|(_, count)| *count >= min_occurrences)
            .map(|(bucket, _)| bucket as f32 * bucket_size)
            .collect();
        edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut merged: Vec<f32> = Vec::with_capacity(edges.len());
        for edge in edges {
            match merged.last() {
                Some(&last) if edge - last < self.config.min_column_gap => {}
                _ => merged.push(edge),
            }
        }
        merged
    }

    /// Contiguous runs of multi-span rows that align with the columns.
    fn find_table_regions(
        &self,
        spans: &[TextSpan],
        rows: &[Row],
        columns: &[f32],
    ) -> Vec<(usize, usize)> {
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;
        let min_rows = self.config.min_rows;
        let mut close = |start: Option<usize>, end: usize| {
            if let Some(s) = start {
                if end + 1 - s >= min_rows {
                    regions.push((s, end));
                }
            }
        };

        for (i, row) in rows.iter().enumerate() {
            let aligned = row.spans.len() >= 2 && alignment_score(spans, row, columns) >= 0.5;
            // A large vertical gap ends the table even when alignment continues.
            let contiguous = i > 0 && rows[i - 1].y - row.y <= row.font_size * 2.5;

            match (aligned, start) {
                (true, Some(_)) if contiguous => {}
                (true, _) => {
                    if i > 0 {
                        close(start, i - 1);
                    }
                    start = Some(i);
                }
                (false, _) => {
                    if i > 0 {
                        close(start, i - 1);
                    }
                    start = None;
                }
            }
        }
        if !rows.is_empty() {
            close(start, rows.len() - 1);
        }

        regions
    }

    fn build_candidate(&self, spans: &[TextSpan], region: &[Row], columns: &[f32]) -> TableCandidate {
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(region.len());
        let mut used = Vec::new();
        let mut alignment = 0.0;

        for row in region {
            let mut row_cells = vec![String::new(); columns.len()];
            for &idx in &row.spans {
                let col = column_for(spans[idx].x, columns);
                let cell = &mut row_cells[col];
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(spans[idx].text.trim());
                used.push(idx);
            }
            while row_cells.last().is_some_and(|c| c.is_empty()) {
                row_cells.pop();
            }
            alignment += alignment_score(spans, row, columns);
            cells.push(row_cells);
        }
        alignment /= region.len().max(1) as f32;

        let bbox = BoundingBox::from_points(
            &used
                .iter()
                .flat_map(|&i| {
                    let s = &spans[i];
                    [(s.x, s.y), (s.right(), s.top())]
                })
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();

        TableCandidate {
            confidence: table_confidence(&cells, alignment),
            rows: cells,
            bbox,
            method: TableMethod::Stream,
            spans: used,
        }
    }

    /// Rows whose first cell is a bullet or enumerator are lists, not tables.
    fn is_list_pattern(&self, spans: &[TextSpan], rows: &[Row], columns: &[f32]) -> bool {
        if columns.len() < 2 || rows.is_empty() {
            return false;
        }

        let mut bullets = 0;
        let mut markers = 0;
        for row in rows {
            let Some(&first) = row.spans.first() else {
                continue;
            };
            let text = spans[first].text.trim();
            if is_bullet_marker(text) {
                bullets += 1;
            } else if is_enumerator(text) {
                markers += 1;
            }
        }

        let bullet_ratio = bullets as f32 / rows.len() as f32;
        let marker_ratio = (bullets + markers) as f32 / rows.len() as f32;

        bullet_ratio >= 0.5 || (columns.len() == 2 && marker_ratio >= 0.5)
    }
}

fn make_row(spans: &[TextSpan], mut indices: Vec<usize>) -> Row {
    indices.sort_by(|&a, &b| {
        spans[a]
            .x
            .partial_cmp(&spans[b].x)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let n = indices.len().max(1) as f32;
    Row {
        y: indices.iter().map(|&i| spans[i].y).sum::<f32>() / n,
        font_size: indices.iter().map(|&i| spans[i].font_size).sum::<f32>() / n,
        spans: indices,
    }
}

fn alignment_score(spans: &[TextSpan], row: &Row, columns: &[f32]) -> f32 {
    if row.spans.is_empty() || columns.is_empty() {
        return 0.0;
    }
    let aligned = row
        .spans
        .iter()
        .filter(|&&i| columns.iter().any(|c| (spans[i].x - c).abs() <= ALIGN_TOLERANCE))
        .count();
    aligned as f32 / row.spans.len() as f32
}

/// Index of the rightmost column starting at or before `x`.
fn column_for(x: f32, columns: &[f32]) -> usize {
    columns
        .iter()
        .rposition(|&c| c <= x + ALIGN_TOLERANCE)
        .unwrap_or(0)
}

fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text,
        "•" | "●" | "○" | "■" | "□" | "◆" | "▪" | "-" | "–" | "*" | "·"
    )
}

/// `1.`, `2)`, `(3)`, `a.`, `A.`, `(B)`, `（C）`, `iv.`
fn is_enumerator(text: &str) -> bool {
    let inner = text
        .trim_start_matches(['(', '（'])
        .trim_end_matches(['.', ')', '）', '、', '。']);
    if inner.is_empty() || inner.len() == text.len() {
        return false;
    }
    inner.chars().all(|c| c.is_ascii_digit())
        || (inner.chars().count() == 1 && inner.chars().all(|c| c.is_ascii_alphabetic()))
        || (inner.len() <= 4 && inner.chars().all(|c| "ivxlIVXL".contains(c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, x: f32, y: f32) -> TextSpan {
        let mut s = TextSpan::new(text.to_string(), x, y, 10.0, "Helvetica".to_string());
        s.width = text.chars().count() as f32 * 5.0;
        s
    }

    fn grade_table() -> Vec<TextSpan> {
        vec![
            span("Name", 72.0, 700.0),
            span("Score", 200.0, 700.0),
            span("Grade", 320.0, 700.0),
            span("Alice", 72.0, 686.0),
            span("92", 200.0, 686.0),
            span("A", 320.0, 686.0),
            span("Bob", 72.0, 672.0),
            span("78", 200.0, 672.0),
            span("C", 320.0, 672.0),
        ]
    }

    #[test]
    fn test_group_into_rows() {
        let detector = StreamDetector::new();
        let spans = vec![
            span("A", 72.0, 700.0),
            span("B", 150.0, 701.0),
            span("C", 72.0, 680.0),
        ];
        let rows = detector.group_into_rows(&spans);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].spans.len(), 2);
        assert_eq!(rows[1].spans.len(), 1);
    }

    #[test]
    fn test_detect_simple_table() {
        let spans = grade_table();
        let tables = StreamDetector::new().detect(&spans);
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        assert_eq!(table.method, TableMethod::Stream);
        assert_eq!(table.rows[0], vec!["Name", "Score", "Grade"]);
        assert_eq!(table.rows[2], vec!["Bob", "78", "C"]);
        assert_eq!(table.spans.len(), 9);
        assert!(table.confidence > 0.9);
        assert!(table.is_good(&Thresholds::default()));
    }

    #[test]
    fn test_column_gap_comes_from_thresholds() {
        let wide_gap = Thresholds {
            table_column_gap: 1000.0,
            ..Thresholds::default()
        };
        let detector = StreamDetector::with_config(StreamConfig::from(&wide_gap));
        assert!(detector.detect(&grade_table()).is_empty());
        let detector = StreamDetector::with_config(StreamConfig::from(&Thresholds::default()));
        assert_eq!(detector.detect(&grade_table()).len(), 1);
    }

    #[test]
    fn test_no_table_single_column() {
        let spans = vec![
            span("Plants need light.", 72.0, 700.0),
            span("They also need water.", 72.0, 686.0),
            span("And carbon dioxide.", 72.0, 672.0),
        ];
        assert!(StreamDetector::new().detect(&spans).is_empty());
    }

    #[test]
    fn test_numbered_list_not_detected_as_table() {
        let spans = vec![
            span("1.", 72.0, 700.0),
            span("What is photosynthesis?", 90.0, 700.0),
            span("2.", 72.0, 686.0),
            span("Name the green pigment.", 90.0, 686.0),
            span("3.", 72.0, 672.0),
            span("Where does it happen?", 90.0, 672.0),
        ];
        assert!(StreamDetector::new().detect(&spans).is_empty());
    }

    #[test]
    fn test_option_labels_not_detected_as_table() {
        let spans = vec![
            span("(A)", 90.0, 700.0),
            span("3", 120.0, 700.0),
            span("(B)", 90.0, 686.0),
            span("4", 120.0, 686.0),
        ];
        assert!(StreamDetector::new().detect(&spans).is_empty());
    }

    #[test]
    fn test_ragged_candidate_is_low_quality() {
        let spans = vec![
            span("Term", 72.0, 700.0),
            span("Meaning", 200.0, 700.0),
            span("Unit", 320.0, 700.0),
            span("Mass", 72.0, 686.0),
            span("Amount of matter", 200.0, 686.0),
            span("kg", 320.0, 686.0),
            span("Force", 72.0, 672.0),
            span("Push or pull", 200.0, 672.0),
            span("Speed", 72.0, 658.0),
            span("How fast", 200.0, 658.0),
        ];
        let tables = StreamDetector::new().detect(&spans);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert!(!table.is_good(&Thresholds::default()));
        assert!(table.is_good(&Thresholds {
            table_max_raggedness: 1.0,
            ..Thresholds::default()
        }));
    }

    #[test]
    fn test_confidence_monotonic_in_alignment() {
        let rows = vec![vec!["a".to_string(), "b".to_string()]; 3];
        assert!(table_confidence(&rows, 1.0) > table_confidence(&rows, 0.5));
        assert_eq!(table_confidence(&[], 1.0), 0.0);
    }

    #[test]
    fn test_is_enumerator() {
        assert!(is_enumerator("1."));
        assert!(is_enumerator("12)"));
        assert!(is_enumerator("(A)"));
        assert!(is_enumerator("（C）"));
        assert!(is_enumerator("iv."));
        assert!(!is_enumerator("Alice"));
        assert!(!is_enumerator("92"));
        assert!(!is_enumerator("."));
    }
}

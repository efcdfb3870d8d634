//! Table types.

use super::BoundingBox;
use serde::{Deserialize, Serialize};

/// How a table was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMethod {
    /// Text-position clustering (fast, no ruling lines needed)
    Stream,
    /// Grid reconstructed from ruling lines
    Lattice,
    /// Table markup present in the source (DOCX)
    Native,
}

impl TableMethod {
    /// Preference order used to break confidence ties.
    pub fn preference(&self) -> u8 {
        match self {
            TableMethod::Native => 0,
            TableMethod::Stream => 1,
            TableMethod::Lattice => 2,
        }
    }
}

/// Paragraphs surrounding a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableContext {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A table extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    /// Stable identifier within the document (`table-1`, `table-2`, ...)
    pub id: String,

    /// Page number (1-indexed) for paginated sources
    pub page: Option<u32>,

    /// Cell text, row-major
    pub rows: Vec<Vec<String>>,

    /// Confidence in `[0, 1]`
    pub extraction_confidence: f32,

    /// Extraction method that produced this table
    pub method: TableMethod,

    /// Surrounding paragraphs
    #[serde(default)]
    pub context: TableContext,

    /// Region on the page, in PDF user space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl TableBlock {
    /// Create a new table.
    pub fn new(id: impl Into<String>, rows: Vec<Vec<String>>, method: TableMethod) -> Self {
        Self {
            id: id.into(),
            page: None,
            rows,
            extraction_confidence: 1.0,
            method,
            context: TableContext::default(),
            bbox: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.extraction_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the widest row's cell count.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(|c| c.trim().is_empty()))
    }

    /// Fraction of rows whose cell count differs from the widest row.
    pub fn raggedness(&self) -> f32 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let width = self.column_count();
        let ragged = self.rows.iter().filter(|r| r.len() != width).count();
        ragged as f32 / self.rows.len() as f32
    }

    /// Fraction of empty cells over the full grid.
    pub fn empty_ratio(&self) -> f32 {
        let total = self.row_count() * self.column_count();
        if total == 0 {
            return 1.0;
        }
        let filled: usize = self
            .rows
            .iter()
            .map(|r| r.iter().filter(|c| !c.trim().is_empty()).count())
            .sum();
        1.0 - filled as f32 / total as f32
    }

    /// Get plain text representation of the table (tab-separated cells).
    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.join("\t"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_table_dimensions() {
        let table = TableBlock::new(
            "table-1",
            rows(&[&["Term", "Meaning"], &["Mitosis", "Cell division"]]),
            TableMethod::Stream,
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.raggedness(), 0.0);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_raggedness() {
        let table = TableBlock::new(
            "t",
            rows(&[&["a", "b", "c"], &["d"], &["e", "f", "g"], &["h", "i"]]),
            TableMethod::Stream,
        );
        assert!((table.raggedness() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let table = TableBlock::new("t", Vec::new(), TableMethod::Lattice).with_confidence(1.7);
        assert_eq!(table.extraction_confidence, 1.0);
    }

    #[test]
    fn test_plain_text() {
        let table = TableBlock::new("t", rows(&[&["x", "y"], &["1", "2"]]), TableMethod::Native);
        assert_eq!(table.plain_text(), "x\ty\n1\t2");
    }
}

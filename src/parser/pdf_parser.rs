//! PDF document parser.
//!
//! Each page is interpreted independently (in parallel when enabled) into
//! positioned text, ruling lines and image placements; the results are then
//! assembled in page order into a [`NormalizedDocument`].

use std::collections::HashSet;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;

use crate::detect::DocumentFormat;
use crate::error::{Error, Result};
use crate::model::{
    DocumentBuilder, ExtractionWarning, FigureRef, Heading, NormalizedDocument, TableContext,
};

use super::backend::{LopdfBackend, PageId, PdfBackend, PdfInfo};
use super::content::{ImagePlacement, PageContent, PageInterpreter};
use super::lattice::{LatticeConfig, LatticeDetector};
use super::layout::{BlockType, LayoutAnalyzer, TextSpan};
use super::math::detect_math_regions;
use super::normalize::clean_text;
use super::options::{ErrorMode, ParseOptions, Thresholds};
use super::table_detector::{StreamConfig, StreamDetector, TableCandidate};
use super::DocumentParser;

static CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:figure|fig\.?)|圖)\s*([0-9]+(?:[.\-][0-9]+)*[A-Za-z]?)")
        .expect("valid regex")
});

/// PDF parser backed by lopdf.
#[derive(Debug, Default)]
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for PdfParser {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Pdf
    }

    fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
        let backend = LopdfBackend::load_bytes(data)?;
        log::debug!("pdf: version {}", backend.version());
        parse_with_backend(&backend, options)
    }
}

/// One unit of page content, in reading order.
#[derive(Debug)]
enum PageItem {
    Heading(u8, String),
    Paragraph(String),
    Table(TableCandidate, TableContext),
    Figure(ImagePlacement),
}

/// Outcome of extracting one page.
#[derive(Debug)]
enum PageOutcome {
    Structured {
        items: Vec<PageItem>,
        image_count: usize,
    },
    TextOnly {
        text: String,
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

/// Parse a PDF through any backend.
pub(crate) fn parse_with_backend<B: PdfBackend + ?Sized>(
    backend: &B,
    options: &ParseOptions,
) -> Result<NormalizedDocument> {
    let pages: Vec<(u32, PageId)> = backend
        .pages()
        .into_iter()
        .filter(|(number, _)| options.includes_page(*number))
        .collect();
    let total_pages = backend.pages().len() as u32;

    let extract = |&(number, id): &(u32, PageId)| extract_page(backend, number, id, options);
    let outcomes: Vec<Result<PageOutcome>> = if options.parallel && pages.len() > 1 {
        pages.par_iter().map(extract).collect()
    } else {
        pages.iter().map(extract).collect()
    };

    let mut builder = DocumentBuilder::new(DocumentFormat::Pdf);
    apply_info(&mut builder, backend.info());
    builder.metadata_mut().page_count = Some(total_pages);

    let mut image_count = 0;
    let mut table_seq = 0;
    let mut figure_seq = 0;
    let mut used_figure_ids: HashSet<String> = HashSet::new();

    for ((number, _), outcome) in pages.iter().zip(outcomes) {
        match outcome? {
            PageOutcome::Structured {
                items,
                image_count: images,
            } => {
                image_count += images;
                let mut iter = items.into_iter().peekable();
                while let Some(item) = iter.next() {
                    match item {
                        PageItem::Heading(level, text) => {
                            builder.push_heading(Heading::new(level, text).on_page(*number));
                        }
                        PageItem::Paragraph(text) => builder.push_paragraph(text),
                        PageItem::Table(candidate, context) => {
                            table_seq += 1;
                            if candidate.confidence < options.thresholds.table_min_confidence {
                                builder.warn(ExtractionWarning::LowQualityTable {
                                    page: Some(*number),
                                    confidence: candidate.confidence,
                                });
                            }
                            let mut block =
                                candidate.into_block(format!("table-{}", table_seq), *number);
                            block.context = context;
                            builder.push_table(block);
                        }
                        PageItem::Figure(placement) => {
                            figure_seq += 1;
                            let caption = match iter.peek() {
                                Some(PageItem::Paragraph(text)) if CAPTION.is_match(text) => {
                                    text.lines().next().map(str::to_string)
                                }
                                _ => None,
                            };
                            let id = caption
                                .as_deref()
                                .and_then(|c| CAPTION.captures(c))
                                .map(|c| c[1].to_string())
                                .filter(|id| !used_figure_ids.contains(id))
                                .unwrap_or_else(|| figure_seq.to_string());
                            used_figure_ids.insert(id.clone());

                            let mut figure = FigureRef::new(id)
                                .on_page(*number)
                                .with_bbox(placement.bbox);
                            figure.caption = caption;
                            builder.push_figure(figure);
                        }
                    }
                }
            }
            PageOutcome::TextOnly { text, reason } => {
                builder.warn(ExtractionWarning::TextOnlyFallback {
                    page: *number,
                    reason,
                });
                for paragraph in clean_text(&text).split("\n\n") {
                    builder.push_paragraph(paragraph);
                }
            }
            PageOutcome::Skipped { reason } => {
                builder.warn(ExtractionWarning::PageSkipped {
                    page: *number,
                    reason,
                });
            }
        }
    }

    let chars = builder.text_len();
    if chars < options.thresholds.min_pdf_text_len && image_count > 0 {
        builder.warn(ExtractionWarning::MissingTextLayer { chars });
    }

    let thresholds = options.thresholds.clone();
    let detect_math = options.detect_math;
    Ok(builder.finish(|text| {
        if detect_math {
            detect_math_regions(text, &thresholds)
        } else {
            Vec::new()
        }
    }))
}

fn extract_page<B: PdfBackend + ?Sized>(
    backend: &B,
    number: u32,
    id: PageId,
    options: &ParseOptions,
) -> Result<PageOutcome> {
    let content = PageInterpreter::new(backend, id).and_then(|interpreter| interpreter.run());

    match content {
        Ok(content) => Ok(PageOutcome::Structured {
            image_count: content.images.len(),
            items: layout_page(content, options),
        }),
        Err(e) if options.error_mode == ErrorMode::Strict => Err(Error::CorruptDocument(format!(
            "page {}: {}",
            number, e
        ))),
        Err(e) => {
            log::debug!("page {}: structural extraction failed: {}", number, e);
            match backend.page_text(number) {
                Ok(text) => Ok(PageOutcome::TextOnly {
                    text,
                    reason: e.to_string(),
                }),
                Err(fallback) => Ok(PageOutcome::Skipped {
                    reason: format!("{}; {}", e, fallback),
                }),
            }
        }
    }
}

/// Turn raw page content into reading-ordered items.
fn layout_page(content: PageContent, options: &ParseOptions) -> Vec<PageItem> {
    let PageContent {
        spans,
        rulings,
        images,
    } = content;
    let spans: Vec<TextSpan> = spans
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    let mut analyzer = LayoutAnalyzer::new(options.thresholds.heading_size_ratio);
    analyzer.observe(&spans);

    let tables = if options.extract_tables {
        let thresholds = &options.thresholds;
        let stream = StreamDetector::with_config(StreamConfig::from(thresholds)).detect(&spans);
        let lattice = || {
            LatticeDetector::with_config(LatticeConfig::from(thresholds)).detect(&spans, &rulings)
        };
        select_tables(stream, lattice, thresholds)
    } else {
        Vec::new()
    };
    let consumed: HashSet<usize> = tables.iter().flat_map(|t| t.spans.iter().copied()).collect();
    let flow: Vec<TextSpan> = spans
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(_, s)| s)
        .collect();

    let mut items: Vec<(f32, PageItem)> = analyzer
        .blocks(flow)
        .into_iter()
        .filter_map(|block| {
            let text = clean_text(&block.text());
            if text.is_empty() {
                return None;
            }
            let item = match block.block_type {
                BlockType::Heading => PageItem::Heading(block.heading_level, text.replace('\n', " ")),
                BlockType::Paragraph => PageItem::Paragraph(text),
            };
            Some((block.top_y(), item))
        })
        .collect();

    for table in tables {
        let top = table.bbox.top();
        let at = insertion_point(&items, top);
        let before = items[..at].iter().rev().find_map(|(_, i)| paragraph_text(i));
        let after = items[at..].iter().find_map(|(_, i)| paragraph_text(i));
        let context = TableContext { before, after };
        items.insert(at, (top, PageItem::Table(table, context)));
    }

    if options.extract_figures {
        for image in images {
            let top = image.bbox.top();
            let at = insertion_point(&items, top);
            items.insert(at, (top, PageItem::Figure(image)));
        }
    }

    items.into_iter().map(|(_, item)| item).collect()
}

/// Index of the first item that starts below `top` (PDF y grows upward).
fn insertion_point(items: &[(f32, PageItem)], top: f32) -> usize {
    items
        .iter()
        .position(|(y, _)| *y < top)
        .unwrap_or(items.len())
}

fn paragraph_text(item: &PageItem) -> Option<String> {
    match item {
        PageItem::Paragraph(text) => Some(text.clone()),
        _ => None,
    }
}

/// Pick table candidates: the fast stream method first, the lattice method
/// only when stream results are empty or low quality, then the best
/// candidate per region. Equal confidence prefers the stream candidate.
fn select_tables(
    stream: Vec<TableCandidate>,
    lattice: impl FnOnce() -> Vec<TableCandidate>,
    thresholds: &Thresholds,
) -> Vec<TableCandidate> {
    if !stream.is_empty() && stream.iter().all(|c| c.is_good(thresholds)) {
        return stream;
    }

    let lattice = lattice();
    log::debug!(
        "tables: {} stream candidate(s) below quality, {} lattice candidate(s)",
        stream.len(),
        lattice.len()
    );

    let mut candidates: Vec<TableCandidate> = stream.into_iter().chain(lattice).collect();
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.method.preference().cmp(&b.method.preference()))
    });

    let mut chosen: Vec<TableCandidate> = Vec::new();
    for candidate in candidates {
        let clashes = chosen.iter().any(|c| {
            c.same_region(&candidate) || c.spans.iter().any(|i| candidate.spans.contains(i))
        });
        if !clashes {
            chosen.push(candidate);
        }
    }
    chosen.sort_by(|a, b| {
        b.bbox
            .top()
            .partial_cmp(&a.bbox.top())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chosen
}

fn apply_info(builder: &mut DocumentBuilder, info: PdfInfo) {
    let metadata = builder.metadata_mut();
    metadata.title = info.title.filter(|t| !t.trim().is_empty());
    metadata.author = info.author;
    metadata.subject = info.subject;
    metadata.keywords = info
        .keywords
        .map(|k| {
            k.split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    metadata.created = info.creation_date.as_deref().and_then(parse_pdf_date);
    metadata.modified = info.mod_date.as_deref().and_then(parse_pdf_date);
}

/// Parse PDF date format (D:YYYYMMDDHHmmSS).
pub fn parse_pdf_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = s.strip_prefix("D:").unwrap_or(s);

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let field = |range: std::ops::Range<usize>, default: u32| {
        s.get(range).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    chrono::NaiveDate::from_ymd_opt(year, field(4..6, 1), field(6..8, 1))
        .and_then(|date| date.and_hms_opt(field(8..10, 0), field(10..12, 0), field(12..14, 0)))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::super::backend::mock::{default_fonts, show, MockBackend};
    use super::super::backend::{ContentOp, PdfValue};
    use super::super::content::Ruling;
    use crate::model::{BoundingBox, TableMethod};
    use super::*;
    use chrono::Datelike;

    fn backend(pages: Vec<Vec<ContentOp>>) -> MockBackend {
        MockBackend {
            images: vec![Vec::new(); pages.len()],
            text: vec![String::new(); pages.len()],
            pages,
            fonts: default_fonts(),
            ..Default::default()
        }
    }

    fn lines(items: &[(&str, f32, f32, bool)]) -> Vec<ContentOp> {
        items
            .iter()
            .flat_map(|(text, y, size, bold)| show(text, 72.0, *y, *size, *bold))
            .collect()
    }

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20240115103045+09'00'").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 15);
    }

    #[test]
    fn test_parse_pdf_date_minimal() {
        let date = parse_pdf_date("D:2024").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert!(parse_pdf_date("D:20").is_none());
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let page = lines(&[
            ("Chapter 1 Cells", 740.0, 20.0, true),
            ("Cells are the basic unit of life.", 700.0, 11.0, false),
            ("Every organism is made of cells.", 686.0, 11.0, false),
            ("Cell Membrane", 650.0, 14.0, true),
            ("The membrane controls what enters.", 630.0, 11.0, false),
        ]);
        let doc = parse_with_backend(&backend(vec![page]), &ParseOptions::default()).unwrap();

        assert_eq!(doc.headings.len(), 2);
        assert_eq!(doc.headings[0].text, "Chapter 1 Cells");
        assert_eq!(doc.headings[0].level, 1);
        assert_eq!(doc.headings[1].level, 2);
        assert_eq!(doc.headings[1].page, Some(1));
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(
            doc.paragraphs[0],
            "Cells are the basic unit of life.\nEvery organism is made of cells."
        );
        assert_eq!(doc.outline.items.len(), 1);
        assert_eq!(doc.outline.items[0].children.len(), 1);
        assert_eq!(doc.metadata.page_count, Some(1));
    }

    #[test]
    fn test_broken_page_falls_back_to_text() {
        let mut mock = backend(vec![
            lines(&[("Intact page text.", 700.0, 11.0, false)]),
            Vec::new(),
        ]);
        mock.broken = vec![2];
        mock.text[1] = "Recovered text of page two.".to_string();

        let doc = parse_with_backend(&mock, &ParseOptions::default()).unwrap();
        assert_eq!(doc.paragraphs, vec!["Intact page text.", "Recovered text of page two."]);
        assert!(matches!(
            doc.warnings.as_slice(),
            [ExtractionWarning::TextOnlyFallback { page: 2, .. }]
        ));
    }

    #[test]
    fn test_broken_page_is_error_in_strict_mode() {
        let mut mock = backend(vec![Vec::new()]);
        mock.broken = vec![1];
        let err = parse_with_backend(&mock, &ParseOptions::default().strict()).unwrap_err();
        assert!(matches!(err, Error::CorruptDocument(_)));
    }

    #[test]
    fn test_stream_table_with_context() {
        let mut page = lines(&[("Results of the quiz:", 760.0, 11.0, false)]);
        for (i, row) in [["Name", "Score"], ["Alice", "92"], ["Bob", "78"]].iter().enumerate() {
            let y = 720.0 - i as f32 * 14.0;
            page.extend(show(row[0], 72.0, y, 11.0, false));
            page.extend(show(row[1], 250.0, y, 11.0, false));
        }
        page.extend(show("Everyone passed.", 72.0, 640.0, 11.0, false));

        let doc = parse_with_backend(&backend(vec![page]), &ParseOptions::default()).unwrap();
        assert_eq!(doc.tables.len(), 1);
        let table = &doc.tables[0];
        assert_eq!(table.id, "table-1");
        assert_eq!(table.rows[1], vec!["Alice", "92"]);
        assert_eq!(table.context.before.as_deref(), Some("Results of the quiz:"));
        assert_eq!(table.context.after.as_deref(), Some("Everyone passed."));
        assert_eq!(doc.paragraphs, vec!["Results of the quiz:", "Everyone passed."]);
    }

    fn candidate(method: TableMethod, rows: &[&[&str]], confidence: f32) -> TableCandidate {
        TableCandidate {
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
            bbox: BoundingBox::new(72.0, 600.0, 300.0, 100.0),
            method,
            confidence,
            spans: Vec::new(),
        }
    }

    #[test]
    fn test_lattice_skipped_when_stream_tables_are_good() {
        let ran = std::cell::Cell::new(false);
        let good = candidate(TableMethod::Stream, &[&["Name", "Score"], &["Alice", "92"]], 0.95);
        let chosen = select_tables(
            vec![good],
            || {
                ran.set(true);
                Vec::new()
            },
            &Thresholds::default(),
        );
        assert!(!ran.get());
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].method, TableMethod::Stream);

        let chosen = select_tables(
            Vec::new(),
            || {
                ran.set(true);
                vec![candidate(TableMethod::Lattice, &[&["a", "b"], &["c", "d"]], 0.9)]
            },
            &Thresholds::default(),
        );
        assert!(ran.get());
        assert_eq!(chosen[0].method, TableMethod::Lattice);
    }

    #[test]
    fn test_equal_confidence_prefers_stream() {
        let stream = candidate(TableMethod::Stream, &[&["a", "b"], &["c"]], 0.8);
        let lattice = candidate(TableMethod::Lattice, &[&["a", "b"], &["c", ""]], 0.8);
        let chosen = select_tables(vec![stream], || vec![lattice], &Thresholds::default());
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].method, TableMethod::Stream);
    }

    #[test]
    fn test_ruled_grid_beats_ragged_stream_table() {
        let span = |text: &str, x: f32, y: f32| {
            let mut s = TextSpan::new(text.to_string(), x, y, 10.0, "Helvetica".to_string());
            s.width = text.chars().count() as f32 * 5.0;
            s
        };
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
        let mut rulings = Vec::new();
        for y in [710.0, 695.0, 681.0, 667.0, 652.0] {
            rulings.push(Ruling::new(60.0, y, 400.0, y));
        }
        for x in [60.0, 190.0, 310.0, 400.0] {
            rulings.push(Ruling::new(x, 652.0, x, 710.0));
        }

        let thresholds = Thresholds::default();
        let stream = StreamDetector::new().detect(&spans);
        assert!(!stream.is_empty());
        assert!(!stream[0].is_good(&thresholds));

        let chosen = select_tables(stream, || LatticeDetector::new().detect(&spans, &rulings), &thresholds);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].method, TableMethod::Lattice);
        assert_eq!(chosen[0].rows[1], vec!["Mass", "Amount of matter", "kg"]);
        assert_eq!(chosen[0].rows[3], vec!["Speed", "How fast", ""]);
    }

    #[test]
    fn test_figure_with_caption_and_missing_text_layer() {
        let mut page = vec![
            ContentOp::new("q", vec![]),
            ContentOp::new(
                "cm",
                vec![
                    PdfValue::Integer(300),
                    PdfValue::Integer(0),
                    PdfValue::Integer(0),
                    PdfValue::Integer(200),
                    PdfValue::Integer(72),
                    PdfValue::Integer(450),
                ],
            ),
            ContentOp::new("Do", vec![PdfValue::Name(b"Im0".to_vec())]),
            ContentOp::new("Q", vec![]),
        ];
        page.extend(show("Figure 3 The water cycle", 72.0, 430.0, 10.0, false));

        let mut mock = backend(vec![page]);
        mock.images = vec![vec![b"Im0".to_vec()]];
        let doc = parse_with_backend(&mock, &ParseOptions::default()).unwrap();

        assert_eq!(doc.figures.len(), 1);
        let figure = &doc.figures[0];
        assert_eq!(figure.image_id, "3");
        assert_eq!(figure.caption.as_deref(), Some("Figure 3 The water cycle"));
        assert_eq!(figure.page, Some(1));
        assert!(doc
            .warnings
            .iter()
            .any(|w| matches!(w, ExtractionWarning::MissingTextLayer { .. })));
    }

    #[test]
    fn test_page_range_and_sequential_match_parallel() {
        let pages: Vec<Vec<ContentOp>> = (1..=4)
            .map(|n| lines(&[(&format!("Page {} body text.", n), 700.0, 11.0, false)]))
            .collect();
        let mock = backend(pages);

        let parallel = parse_with_backend(&mock, &ParseOptions::default()).unwrap();
        let sequential = parse_with_backend(&mock, &ParseOptions::default().sequential()).unwrap();
        assert_eq!(parallel, sequential);

        let ranged = parse_with_backend(&mock, &ParseOptions::default().with_pages(2, 3)).unwrap();
        assert_eq!(ranged.paragraphs, vec!["Page 2 body text.", "Page 3 body text."]);
        assert_eq!(ranged.metadata.page_count, Some(4));
    }

    #[test]
    fn test_math_regions_detected() {
        let page = lines(&[
            ("Solve for x.", 700.0, 11.0, false),
            ("2x + 3 = 11", 660.0, 11.0, false),
        ]);
        let doc = parse_with_backend(&backend(vec![page]), &ParseOptions::default()).unwrap();
        assert_eq!(doc.math_regions.len(), 1);
        assert_eq!(doc.math_text(&doc.math_regions[0]), Some("2x + 3 = 11"));

        let page = lines(&[("2x + 3 = 11", 660.0, 11.0, false)]);
        let doc = parse_with_backend(&backend(vec![page]), &ParseOptions::default().text_only())
            .unwrap();
        assert!(doc.math_regions.is_empty());
    }
}

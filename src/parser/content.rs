//! Content stream interpretation.
//!
//! Walks the decoded operations of one page and collects positioned text
//! spans, ruling lines (for lattice table detection) and image placements.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::BoundingBox;

use super::backend::{get_number_from_value, ContentOp, PageId, PdfBackend, PdfValue};
use super::layout::{is_spaceless_script_char, TextSpan};

/// A straight stroke on the page, in user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruling {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Ruling {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn is_horizontal(&self) -> bool {
        (self.y0 - self.y1).abs() <= 1.0 && (self.x0 - self.x1).abs() > 1.0
    }

    pub fn is_vertical(&self) -> bool {
        (self.x0 - self.x1).abs() <= 1.0 && (self.y0 - self.y1).abs() > 1.0
    }

    pub fn length(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }
}

/// An image XObject drawn on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub name: String,
    pub bbox: BoundingBox,
}

/// Everything collected from one page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub spans: Vec<TextSpan>,
    pub rulings: Vec<Ruling>,
    pub images: Vec<ImagePlacement>,
}

/// Affine matrix `[a b c d e f]` as used by PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self × other`
    fn multiply(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn from_operands(operands: &[PdfValue]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, value) in m.iter_mut().zip(operands) {
            *slot = get_number_from_value(value)?;
        }
        Some(Matrix(m))
    }
}

/// Text matrix for tracking position in content stream.
#[derive(Debug, Clone)]
struct TextMatrix {
    matrix: Matrix,
    line: Matrix,
    leading: f32,
}

impl Default for TextMatrix {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line: Matrix::IDENTITY,
            leading: 0.0,
        }
    }
}

impl TextMatrix {
    fn set(&mut self, m: Matrix) {
        self.matrix = m;
        self.line = m;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        let moved = Matrix([1.0, 0.0, 0.0, 1.0, tx, ty]).multiply(&self.line);
        self.set(moved);
    }

    fn next_line(&mut self, font_size: f32) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            font_size * 1.2
        };
        self.translate(0.0, -leading);
    }

    fn scale(&self) -> f32 {
        let [a, b, ..] = self.matrix.0;
        (a * a + b * b).sqrt()
    }
}

/// Interprets the content stream of one page.
pub struct PageInterpreter<'a, B: PdfBackend + ?Sized> {
    backend: &'a B,
    page: PageId,
    fonts: HashMap<Vec<u8>, String>,
    images: HashSet<Vec<u8>>,
}

impl<'a, B: PdfBackend + ?Sized> PageInterpreter<'a, B> {
    pub fn new(backend: &'a B, page: PageId) -> Result<Self> {
        let fonts = backend
            .page_fonts(page)?
            .into_iter()
            .map(|f| (f.name, f.base_font))
            .collect();
        let images = backend.page_image_names(page)?.into_iter().collect();
        Ok(Self {
            backend,
            page,
            fonts,
            images,
        })
    }

    /// Run the page's operations and collect content.
    pub fn run(&self) -> Result<PageContent> {
        let ops = self.backend.page_operations(self.page)?;
        Ok(self.interpret(&ops))
    }

    fn interpret(&self, ops: &[ContentOp]) -> PageContent {
        let mut out = PageContent::default();

        let mut ctm = Matrix::IDENTITY;
        let mut ctm_stack: Vec<Matrix> = Vec::new();
        let mut tm = TextMatrix::default();
        let mut font_key: Vec<u8> = Vec::new();
        let mut font_name = String::new();
        let mut font_size: f32 = 12.0;
        let mut in_text = false;

        let mut path: Vec<Ruling> = Vec::new();
        let mut cursor: Option<(f32, f32)> = None;
        let mut subpath_start: Option<(f32, f32)> = None;

        for op in ops {
            let num = |i: usize| op.operands.get(i).and_then(get_number_from_value);

            match op.operator.as_str() {
                "q" => ctm_stack.push(ctm),
                "Q" => ctm = ctm_stack.pop().unwrap_or(Matrix::IDENTITY),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        ctm = m.multiply(&ctm);
                    }
                }
                "BT" => {
                    in_text = true;
                    tm = TextMatrix {
                        leading: tm.leading,
                        ..TextMatrix::default()
                    };
                }
                "ET" => in_text = false,
                "Tf" => {
                    if let Some(PdfValue::Name(name)) = op.operands.first() {
                        font_key = name.clone();
                        font_name = self
                            .fonts
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| String::from_utf8_lossy(name).to_string());
                    }
                    font_size = num(1).unwrap_or(12.0);
                }
                "TL" => tm.leading = num(0).unwrap_or(0.0),
                "Td" => tm.translate(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
                "TD" => {
                    let ty = num(1).unwrap_or(0.0);
                    tm.leading = -ty;
                    tm.translate(num(0).unwrap_or(0.0), ty);
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        tm.set(m);
                    }
                }
                "T*" => tm.next_line(font_size),
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "'" || op.operator == "\"" {
                        tm.next_line(font_size);
                    }
                    if !in_text {
                        continue;
                    }
                    let text = self.show_text(op, &font_key);
                    if text.trim().is_empty() {
                        continue;
                    }
                    let (tx, ty) = tm.matrix.apply(0.0, 0.0);
                    let (x, y) = ctm.apply(tx, ty);
                    let size = font_size * tm.scale();
                    let mut span = TextSpan::new(text, x, y, size, font_name.clone());
                    span.width = estimate_width(&span.text, size);
                    // Advance so consecutive Tj calls without repositioning do not overlap.
                    let advance = span.width / tm.scale().max(f32::EPSILON);
                    tm.matrix = Matrix([1.0, 0.0, 0.0, 1.0, advance, 0.0]).multiply(&tm.matrix);
                    out.spans.push(span);
                }
                "m" => {
                    if let (Some(x), Some(y)) = (num(0), num(1)) {
                        let p = ctm.apply(x, y);
                        cursor = Some(p);
                        subpath_start = Some(p);
                    }
                }
                "l" => {
                    if let (Some(x), Some(y), Some(from)) = (num(0), num(1), cursor) {
                        let to = ctm.apply(x, y);
                        path.push(Ruling::new(from.0, from.1, to.0, to.1));
                        cursor = Some(to);
                    }
                }
                "h" => {
                    if let (Some(from), Some(start)) = (cursor, subpath_start) {
                        path.push(Ruling::new(from.0, from.1, start.0, start.1));
                        cursor = Some(start);
                    }
                }
                "re" => {
                    if let (Some(x), Some(y), Some(w), Some(h)) = (num(0), num(1), num(2), num(3)) {
                        path.extend(rect_rulings(&ctm, x, y, w, h));
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    out.rulings
                        .extend(path.drain(..).filter(|r| r.is_horizontal() || r.is_vertical()));
                    cursor = None;
                    subpath_start = None;
                }
                "n" => {
                    path.clear();
                    cursor = None;
                    subpath_start = None;
                }
                "Do" => {
                    if let Some(PdfValue::Name(name)) = op.operands.first() {
                        if self.images.contains(name) {
                            let corners = [
                                ctm.apply(0.0, 0.0),
                                ctm.apply(1.0, 0.0),
                                ctm.apply(0.0, 1.0),
                                ctm.apply(1.0, 1.0),
                            ];
                            if let Some(bbox) = BoundingBox::from_points(&corners) {
                                out.images.push(ImagePlacement {
                                    name: String::from_utf8_lossy(name).to_string(),
                                    bbox,
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        out
    }

    /// Decode the string operands of a text-showing operator.
    fn show_text(&self, op: &ContentOp, font_key: &[u8]) -> String {
        match op.operator.as_str() {
            "TJ" => {
                let Some(PdfValue::Array(items)) = op.operands.first() else {
                    return String::new();
                };
                // Adjustments are in 1/1000 text space units; large negative
                // values are word gaps.
                let space_threshold = 200.0;
                let mut combined = String::new();
                for item in items {
                    match item {
                        PdfValue::Str(bytes) => {
                            combined.push_str(&self.backend.decode_text(self.page, font_key, bytes))
                        }
                        PdfValue::Integer(_) | PdfValue::Real(_) => {
                            let adjustment = -get_number_from_value(item).unwrap_or(0.0);
                            let needs_space = adjustment > space_threshold
                                && combined
                                    .chars()
                                    .last()
                                    .is_some_and(|c| !c.is_whitespace() && !is_spaceless_script_char(c));
                            if needs_space {
                                combined.push(' ');
                            }
                        }
                        _ => {}
                    }
                }
                combined
            }
            "\"" => match op.operands.get(2) {
                Some(PdfValue::Str(bytes)) => self.backend.decode_text(self.page, font_key, bytes),
                _ => String::new(),
            },
            _ => match op.operands.first() {
                Some(PdfValue::Str(bytes)) => self.backend.decode_text(self.page, font_key, bytes),
                _ => String::new(),
            },
        }
    }
}

/// Rectangle edges; a thin rectangle collapses to one ruling.
fn rect_rulings(ctm: &Matrix, x: f32, y: f32, w: f32, h: f32) -> Vec<Ruling> {
    let (x0, y0) = ctm.apply(x, y);
    let (x1, y1) = ctm.apply(x + w, y + h);
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (bottom, top) = (y0.min(y1), y0.max(y1));

    if top - bottom <= 2.0 {
        let mid = (top + bottom) / 2.0;
        return vec![Ruling::new(left, mid, right, mid)];
    }
    if right - left <= 2.0 {
        let mid = (left + right) / 2.0;
        return vec![Ruling::new(mid, bottom, mid, top)];
    }
    vec![
        Ruling::new(left, bottom, right, bottom),
        Ruling::new(left, top, right, top),
        Ruling::new(left, bottom, left, top),
        Ruling::new(right, bottom, right, top),
    ]
}

/// Approximate advance width; full-width for CJK, half an em otherwise.
pub fn estimate_width(text: &str, font_size: f32) -> f32 {
    text.chars()
        .map(|c| {
            if is_spaceless_script_char(c) || crate::model::is_cjk(c) {
                font_size
            } else {
                font_size * 0.5
            }
        })
        .sum()
}

//! Raster image parser: preprocessing, math detection and OCR.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::detect::DocumentFormat;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, DocumentBuilder, ExtractionWarning, FigureRef, NormalizedDocument};

use super::math::detect_math_regions;
use super::normalize::clean_text;
use super::ocr::{OcrEngine, OcrMode, TesseractCli};
use super::options::{ErrorMode, ParseOptions};
use super::DocumentParser;

/// Parser for scanned pages, photos and diagrams.
pub struct ImageParser {
    engine: Arc<dyn OcrEngine>,
}

impl Default for ImageParser {
    fn default() -> Self {
        Self::new(Arc::new(TesseractCli::new()))
    }
}

impl ImageParser {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl DocumentParser for ImageParser {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Image(_))
    }

    fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
        let format = image::guess_format(data)
            .map_err(|_| Error::UnsupportedFormat("unrecognized image encoding".into()))?;
        let kind = match crate::detect::sniff_format(data) {
            Some(kind @ DocumentFormat::Image(_)) => kind,
            _ => return Err(Error::UnsupportedFormat(format!("{:?} images", format))),
        };
        let img = image::load_from_memory_with_format(data, format)?;

        let mut builder = DocumentBuilder::new(kind);
        {
            let metadata = builder.metadata_mut();
            metadata.width = Some(img.width());
            metadata.height = Some(img.height());
            metadata.image_format = Some(format!("{:?}", format).to_lowercase());
            metadata.language = Some(options.ocr_language.clone());
        }

        let gray = preprocess(&img);
        let mode = if looks_like_math(&gray, options.thresholds.image_math_stroke_ratio) {
            if self.engine.supports(OcrMode::Math) {
                log::debug!("image: math notation suspected, using math OCR");
                OcrMode::Math
            } else {
                builder.warn(ExtractionWarning::MathOcrUnavailable);
                OcrMode::Standard
            }
        } else {
            OcrMode::Standard
        };

        let text = if self.engine.is_available() {
            let mut png = Vec::new();
            DynamicImage::ImageLuma8(gray).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            let recognized = match self.engine.recognize(&png, mode, &options.ocr_language) {
                Err(e) if mode == OcrMode::Math => {
                    log::warn!("image: math OCR failed ({}), retrying in standard mode", e);
                    builder.warn(ExtractionWarning::MathOcrUnavailable);
                    self.engine
                        .recognize(&png, OcrMode::Standard, &options.ocr_language)?
                }
                result => result?,
            };
            clean_text(&recognized)
        } else if options.error_mode == ErrorMode::Strict {
            return Err(Error::Ocr(format!("{} is not available", self.engine.name())));
        } else {
            log::warn!("image: OCR engine {} unavailable", self.engine.name());
            String::new()
        };

        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        if chars < options.thresholds.min_ocr_text_len {
            builder.warn(ExtractionWarning::LimitedOcrText { chars });
        }

        for paragraph in text.split("\n\n") {
            builder.push_paragraph(paragraph);
        }

        // Little text means the image is itself visual content.
        if options.extract_figures && chars < options.thresholds.document_text_threshold {
            builder.push_figure(FigureRef::new("1").with_bbox(BoundingBox::new(
                0.0,
                0.0,
                img.width() as f32,
                img.height() as f32,
            )));
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
}

/// Grayscale, 3x3 median denoise, then contrast stretch.
pub fn preprocess(img: &DynamicImage) -> GrayImage {
    let gray = img.to_luma8();
    let denoised = median_filter(&gray);
    stretch_contrast(&denoised)
}

fn median_filter(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return img.clone();
    }

    let mut out = img.clone();
    let mut window = [0u8; 9];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut i = 0;
            for dy in 0..3 {
                for dx in 0..3 {
                    window[i] = img.get_pixel(x + dx - 1, y + dy - 1)[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Map the 1st..99th percentile range onto the full 0..255 range.
fn stretch_contrast(img: &GrayImage) -> GrayImage {
    let mut histogram = [0usize; 256];
    for p in img.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let total = (img.width() as usize * img.height() as usize).max(1);
    let cut = total / 100;

    let percentile = |from_top: bool| {
        let mut seen = 0;
        let levels: Box<dyn Iterator<Item = usize>> = if from_top {
            Box::new((0..256).rev())
        } else {
            Box::new(0..256)
        };
        for level in levels {
            seen += histogram[level];
            if seen > cut {
                return level as f32;
            }
        }
        if from_top {
            255.0
        } else {
            0.0
        }
    };
    let (low, high) = (percentile(false), percentile(true));
    if high - low < 1.0 {
        return img.clone();
    }

    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = ((p[0] as f32 - low) / (high - low) * 255.0).clamp(0.0, 255.0);
        p[0] = v.round() as u8;
    }
    out
}

/// Cheap check for equations: many ink clusters are thin horizontal strokes
/// (fraction bars, equals and minus signs).
pub fn looks_like_math(img: &GrayImage, stroke_ratio: f32) -> bool {
    let components = ink_components(img);
    let clusters: Vec<&(u32, u32, usize)> = components.iter().filter(|c| c.2 >= 4).collect();
    if clusters.len() < 5 {
        return false;
    }

    let thin = clusters
        .iter()
        .filter(|(w, h, _)| *h <= 4 && *w >= 8 && *w >= *h * 3)
        .count();
    thin as f32 / clusters.len() as f32 >= stroke_ratio
}

/// Connected dark regions as (width, height, pixel count).
fn ink_components(img: &GrayImage) -> Vec<(u32, u32, usize)> {
    let (w, h) = img.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..(w * h) {
        let (sx, sy) = (start % w, start / w);
        if visited[start as usize] || img.get_pixel(sx, sy)[0] >= 128 {
            continue;
        }

        visited[start as usize] = true;
        stack.push((sx, sy));
        let (mut x0, mut y0, mut x1, mut y1, mut count) = (sx, sy, sx, sy, 0usize);

        while let Some((x, y)) = stack.pop() {
            count += 1;
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);

            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbors {
                if nx >= w || ny >= h {
                    continue;
                }
                let idx = (ny * w + nx) as usize;
                if !visited[idx] && img.get_pixel(nx, ny)[0] < 128 {
                    visited[idx] = true;
                    stack.push((nx, ny));
                }
            }
        }

        components.push((x1 - x0 + 1, y1 - y0 + 1, count));
    }

    components
}

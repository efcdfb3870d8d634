//! Input format detection from magic bytes and caller hints.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Raster image container kinds accepted by the image parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl ImageKind {
    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
            ImageKind::Tiff => "tiff",
            ImageKind::Webp => "webp",
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            image::ImageFormat::Gif => Some(ImageKind::Gif),
            image::ImageFormat::Bmp => Some(ImageKind::Bmp),
            image::ImageFormat::Tiff => Some(ImageKind::Tiff),
            image::ImageFormat::WebP => Some(ImageKind::Webp),
            _ => None,
        }
    }
}

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Image(ImageKind),
    Text,
}

impl DocumentFormat {
    /// Canonical file extension, used when exporting the original content.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Image(kind) => kind.extension(),
            DocumentFormat::Text => "txt",
        }
    }

    /// MIME type for manifests.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Docx => DOCX_MIME,
            DocumentFormat::Image(ImageKind::Png) => "image/png",
            DocumentFormat::Image(ImageKind::Jpeg) => "image/jpeg",
            DocumentFormat::Image(ImageKind::Gif) => "image/gif",
            DocumentFormat::Image(ImageKind::Bmp) => "image/bmp",
            DocumentFormat::Image(ImageKind::Tiff) => "image/tiff",
            DocumentFormat::Image(ImageKind::Webp) => "image/webp",
            DocumentFormat::Text => "text/plain",
        }
    }

    /// Short display name.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Image(_) => "Image",
            DocumentFormat::Text => "Text",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::Image(kind) => write!(f, "Image ({})", kind.extension()),
            other => write!(f, "{}", other.name()),
        }
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Identify the format from the leading bytes alone.
///
/// Returns `None` when the signature is inconclusive (unknown magic, a ZIP
/// that is not a Word document, or binary data that is not UTF-8).
pub fn sniff_format(data: &[u8]) -> Option<DocumentFormat> {
    if data.is_empty() {
        return None;
    }

    if data.starts_with(PDF_MAGIC) {
        return Some(DocumentFormat::Pdf);
    }

    if data.starts_with(ZIP_MAGIC) {
        return is_word_package(data).then_some(DocumentFormat::Docx);
    }

    if let Ok(format) = image::guess_format(data) {
        if let Some(kind) = ImageKind::from_image_format(format) {
            return Some(DocumentFormat::Image(kind));
        }
    }

    let body = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if !body.contains(&0) && std::str::from_utf8(body).is_ok() {
        return Some(DocumentFormat::Text);
    }

    None
}

fn is_word_package(data: &[u8]) -> bool {
    match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(mut archive) => archive.by_name("word/document.xml").is_ok(),
        Err(_) => false,
    }
}

/// Interpret a caller hint: a file extension (with or without the dot),
/// a file name, or a MIME type.
pub fn format_from_hint(hint: &str) -> Option<DocumentFormat> {
    // MIME parameters such as "; charset=utf-8" do not affect the format.
    let hint = hint.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if hint.is_empty() {
        return None;
    }

    if hint.contains('/') {
        return match hint.as_str() {
            "application/pdf" => Some(DocumentFormat::Pdf),
            DOCX_MIME => Some(DocumentFormat::Docx),
            "text/plain" | "text/markdown" => Some(DocumentFormat::Text),
            "image/png" => Some(DocumentFormat::Image(ImageKind::Png)),
            "image/jpeg" | "image/jpg" => Some(DocumentFormat::Image(ImageKind::Jpeg)),
            "image/gif" => Some(DocumentFormat::Image(ImageKind::Gif)),
            "image/bmp" => Some(DocumentFormat::Image(ImageKind::Bmp)),
            "image/tiff" => Some(DocumentFormat::Image(ImageKind::Tiff)),
            "image/webp" => Some(DocumentFormat::Image(ImageKind::Webp)),
            _ => None,
        };
    }

    let ext = hint.rsplit('.').next().unwrap_or(hint.as_str());
    match ext {
        "pdf" => Some(DocumentFormat::Pdf),
        "docx" => Some(DocumentFormat::Docx),
        "txt" | "text" | "md" | "markdown" => Some(DocumentFormat::Text),
        "png" => Some(DocumentFormat::Image(ImageKind::Png)),
        "jpg" | "jpeg" => Some(DocumentFormat::Image(ImageKind::Jpeg)),
        "gif" => Some(DocumentFormat::Image(ImageKind::Gif)),
        "bmp" => Some(DocumentFormat::Image(ImageKind::Bmp)),
        "tif" | "tiff" => Some(DocumentFormat::Image(ImageKind::Tiff)),
        "webp" => Some(DocumentFormat::Image(ImageKind::Webp)),
        _ => None,
    }
}

/// Determine the document format from content and an optional hint.
///
/// A conclusive signature wins over a conflicting hint. An inconclusive
/// signature falls back to the hint; with neither, the input is rejected.
///
/// # Example
/// ```
/// use eduparse::detect::{detect_format, DocumentFormat};
///
/// let format = detect_format(b"%PDF-1.7\n", None).unwrap();
/// assert_eq!(format, DocumentFormat::Pdf);
/// ```
pub fn detect_format(data: &[u8], hint: Option<&str>) -> Result<DocumentFormat> {
    let sniffed = sniff_format(data);
    let hinted = hint.and_then(format_from_hint);

    match (sniffed, hinted) {
        (Some(sniffed), Some(hinted)) if sniffed != hinted => {
            // Text is the weakest signature; an explicit hint overrides it.
            if sniffed == DocumentFormat::Text {
                log::debug!("hint {} overrides text sniff", hinted);
                Ok(hinted)
            } else {
                log::debug!("signature {} overrides hint {}", sniffed, hinted);
                Ok(sniffed)
            }
        }
        (Some(sniffed), _) => Ok(sniffed),
        (None, Some(hinted)) => Ok(hinted),
        (None, None) => Err(Error::UnsupportedFormat(match hint {
            Some(h) => format!("unrecognized signature and unknown hint '{}'", h),
            None => "unrecognized signature and no format hint".to_string(),
        })),
    }
}

/// Detect the format of a file using its content and extension.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<DocumentFormat> {
    let path = path.as_ref();
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    let hint = path.extension().and_then(|e| e.to_str());
    detect_format(&data, hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[&str]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for name in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(b"<x/>").unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_detect_pdf() {
        assert_eq!(sniff_format(b"%PDF-1.7\n%\xe2\xe3"), Some(DocumentFormat::Pdf));
    }

    #[test]
    fn test_detect_docx() {
        let data = zip_with(&["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(sniff_format(&data), Some(DocumentFormat::Docx));
    }

    #[test]
    fn test_zip_without_word_part_is_inconclusive() {
        let data = zip_with(&["xl/workbook.xml"]);
        assert_eq!(sniff_format(&data), None);
    }

    #[test]
    fn test_detect_png() {
        let data = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(
            sniff_format(data),
            Some(DocumentFormat::Image(ImageKind::Png))
        );
    }

    #[test]
    fn test_detect_text() {
        assert_eq!(
            sniff_format("1. 第一題\nA. 選項".as_bytes()),
            Some(DocumentFormat::Text)
        );
    }

    #[test]
    fn test_binary_without_hint_is_unsupported() {
        let data = [0u8, 159, 146, 150, 0, 1];
        let result = detect_format(&data, None);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_binary_with_hint_uses_hint() {
        let data = [0u8, 159, 146, 150];
        let format = detect_format(&data, Some("report.pdf")).unwrap();
        assert_eq!(format, DocumentFormat::Pdf);
    }

    #[test]
    fn test_signature_beats_conflicting_hint() {
        let format = detect_format(b"%PDF-1.4\n", Some("txt")).unwrap();
        assert_eq!(format, DocumentFormat::Pdf);
    }

    #[test]
    fn test_hint_forms() {
        assert_eq!(format_from_hint(".DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(format_from_hint("image/jpeg"), Some(DocumentFormat::Image(ImageKind::Jpeg)));
        assert_eq!(format_from_hint("notes.md"), Some(DocumentFormat::Text));
        assert_eq!(format_from_hint("xlsx"), None);
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        assert_eq!(format_from_hint("text/plain; charset=utf-8"), Some(DocumentFormat::Text));
        assert_eq!(format_from_hint("Application/PDF;version=1.7"), Some(DocumentFormat::Pdf));
        assert_eq!(format_from_hint("; charset=utf-8"), None);

        let data = [0u8, 159, 146, 150];
        let format = detect_format(&data, Some("text/plain; charset=utf-8")).unwrap();
        assert_eq!(format, DocumentFormat::Text);
    }
}

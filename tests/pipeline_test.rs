//! End-to-end tests: DOCX and text sources through analysis and export.

use std::fs;
use std::io::{Cursor, Write};

use eduparse::export::{to_json, to_markdown, ExportOptions, JsonFormat};
use eduparse::{
    analyze_bytes, to_lms_package, DocumentFormat, DocumentType, Eduparse, ParseOptions,
    QuestionType,
};
use zip::write::SimpleFileOptions;

const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

fn para(style: Option<&str>, text: &str) -> String {
    let ppr = style
        .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, s))
        .unwrap_or_default();
    format!(r#"<w:p>{}<w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, ppr, text)
}

fn docx(body: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("word/document.xml", options).unwrap();
    write!(zip, r#"<w:document {}><w:body>{}</w:body></w:document>"#, W_NS, body).unwrap();
    zip.start_file("docProps/core.xml", options).unwrap();
    zip.write_all(
        br#"<cp:coreProperties xmlns:cp="a" xmlns:dc="b"><dc:title>Motion Quiz</dc:title></cp:coreProperties>"#,
    )
    .unwrap();
    zip.finish().unwrap().into_inner()
}

fn quiz_docx() -> Vec<u8> {
    let body = [
        para(Some("Heading1"), "Motion"),
        para(None, "Answer every question."),
        para(Some("Heading2"), "Part A"),
        para(None, "1. What is 2+2?"),
        para(None, "A. 3"),
        para(None, "B. 4"),
        para(None, "2. Explain gravity."),
        para(Some("Heading1"), "Part B"),
        para(None, "3. The unit of force is ____."),
    ]
    .concat();
    docx(&body)
}

#[test]
fn test_docx_quiz_end_to_end() {
    let analysis = Eduparse::new().unwrap().analyze(&quiz_docx(), None).unwrap();

    assert_eq!(analysis.format, DocumentFormat::Docx);
    assert_eq!(analysis.title(), "Motion Quiz");

    let outline = &analysis.document.outline;
    assert_eq!(outline.items.len(), 2);
    assert_eq!(outline.items[0].children[0].title, "Part A");
    assert_eq!(outline.items[1].title, "Part B");

    let q = &analysis.questions;
    assert_eq!(q.len(), 3);
    assert_eq!(q[0].question_type, QuestionType::MultipleChoice);
    assert_eq!(q[0].options.len(), 2);
    assert_eq!(q[1].question_type, QuestionType::Unknown);
    assert_eq!(q[2].question_type, QuestionType::FillInBlank);
    assert_eq!(analysis.document_type, DocumentType::Worksheet);
}

#[test]
fn test_parse_is_idempotent() {
    let data = quiz_docx();
    let pipeline = Eduparse::new().unwrap();
    let a = pipeline.parse(&data, Some("docx")).unwrap();
    let b = pipeline.parse(&data, Some("docx")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_hint_used_only_when_signature_is_inconclusive() {
    // Plain text with a PDF hint is still text-sniffed, but the hint wins over
    // the weak text signature and the PDF parser rejects it.
    let result = Eduparse::new()
        .unwrap()
        .analyze(b"1. Hello?", Some("application/pdf"));
    assert!(result.is_err());

    // A real DOCX signature beats a misleading hint.
    let analysis = Eduparse::new()
        .unwrap()
        .analyze(&quiz_docx(), Some("txt"))
        .unwrap();
    assert_eq!(analysis.format, DocumentFormat::Docx);
}

#[test]
fn test_text_only_options_skip_tables() {
    let pipeline = Eduparse::new()
        .unwrap()
        .with_options(ParseOptions::new().text_only());
    let analysis = pipeline.analyze(&quiz_docx(), None).unwrap();
    assert!(analysis.document.tables.is_empty());
    assert_eq!(analysis.questions.len(), 3);
}

#[test]
fn test_exports() {
    let analysis = analyze_bytes(&quiz_docx(), None).unwrap();

    let json = to_json(&analysis, JsonFormat::Compact).unwrap();
    assert!(json.contains(r#""type":"multiple_choice""#));

    let md = to_markdown(&analysis);
    assert!(md.starts_with("# Motion Quiz\n"));
    assert!(md.contains("## Motion"));
    assert!(md.contains("### Part A"));
    assert!(md.contains("- A. 3"));

    let dir = tempfile::tempdir().unwrap();
    let original = quiz_docx();
    let handle = to_lms_package(
        &analysis,
        &original,
        dir.path().join("motion"),
        &ExportOptions::default().with_zip(true),
    )
    .unwrap();

    assert_eq!(
        fs::read(handle.path_of("content/original.docx")).unwrap(),
        original
    );
    let metadata: serde_json::Value =
        serde_json::from_slice(&fs::read(handle.path_of("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["title"], "Motion Quiz");
    assert_eq!(metadata["content_type"], "worksheet");
    assert!(metadata["created_at"].is_string());
    assert!(handle.archive.unwrap().exists());
}

//! LMS content package writer.
//!
//! Layout of a package directory:
//!
//! ```text
//! metadata.json          descriptor (title, keywords, objectives, time, difficulty, created_at)
//! imsmanifest.xml        IMS CP-style manifest: one organization, one resource
//! content/analysis.json  full analysis
//! content/lesson.md      Markdown rendering
//! content/original.<ext> source bytes, when given
//! ```
//!
//! `created_at` in `metadata.json` is the only timestamp; every other file is
//! a pure function of the analysis.

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Timelike, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use super::{to_json, to_markdown, ExportOptions};
use crate::error::{Error, Result};
use crate::model::{DocumentAnalysis, DocumentType, QuestionType};

const MANIFEST_NS: &str = "http://www.imsglobal.org/xsd/imscp_v1p1";

/// Coarse difficulty estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub identifier: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub learning_objectives: Vec<String>,
    pub estimated_minutes: u32,
    pub difficulty: Difficulty,
    pub content_type: DocumentType,
    pub source_format: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// A written package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageHandle {
    /// Package directory
    pub root: PathBuf,
    /// Files relative to `root`, in write order
    pub files: Vec<PathBuf>,
    /// Zip archive next to `root`, when requested
    pub archive: Option<PathBuf>,
}

impl PackageHandle {
    /// Absolute path of a packaged file.
    pub fn path_of(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

/// Difficulty from question mix, length, concept density and math content.
pub fn estimate_difficulty(analysis: &DocumentAnalysis) -> Difficulty {
    let words = analysis.document.word_count();
    let mut points = 0u32;

    if words > 2000 {
        points += 1;
    }
    if words > 5000 {
        points += 1;
    }

    if !analysis.questions.is_empty() {
        let essays = analysis
            .questions
            .iter()
            .filter(|q| q.question_type == QuestionType::Essay)
            .count();
        let essay_share = essays as f32 / analysis.questions.len() as f32;
        if essay_share > 0.5 {
            points += 2;
        } else if essay_share > 0.2 {
            points += 1;
        }
    }

    let hundreds = (words / 100).max(1);
    if analysis.concepts.len() as f32 / hundreds as f32 > 1.0 {
        points += 1;
    }
    if !analysis.document.math_regions.is_empty() {
        points += 1;
    }

    match points {
        0..=1 => Difficulty::Beginner,
        2..=3 => Difficulty::Intermediate,
        _ => Difficulty::Advanced,
    }
}

/// Minutes needed: reading time plus a per-question allowance.
pub fn estimate_minutes(analysis: &DocumentAnalysis, minutes_per_1000_words: f32) -> u32 {
    let reading = analysis.document.word_count() as f32 / 1000.0 * minutes_per_1000_words;
    let answering: f32 = analysis
        .questions
        .iter()
        .map(|q| match q.question_type {
            QuestionType::MultipleChoice | QuestionType::FillInBlank => 1.0,
            QuestionType::Essay => 5.0,
            QuestionType::Unknown => 2.0,
        })
        .sum();
    ((reading + answering).ceil() as u32).max(1)
}

/// Writes LMS packages.
#[derive(Debug, Clone, Default)]
pub struct PackageWriter {
    options: ExportOptions,
    created_at: Option<DateTime<Utc>>,
}

impl PackageWriter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            created_at: None,
        }
    }

    /// Fix the creation timestamp instead of using the current time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Build the descriptor for an analysis.
    pub fn metadata(&self, analysis: &DocumentAnalysis) -> PackageMetadata {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in analysis.document.metadata.keywords.iter().chain(&analysis.concepts) {
            let keyword = keyword.trim().to_string();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let created_at = created_at.with_nanosecond(0).unwrap_or(created_at);

        PackageMetadata {
            identifier: package_identifier(analysis),
            title: analysis.title().to_string(),
            keywords,
            learning_objectives: analysis.learning_objectives.clone(),
            estimated_minutes: estimate_minutes(analysis, self.options.estimated_minutes_per_1000_words),
            difficulty: estimate_difficulty(analysis),
            content_type: analysis.document_type,
            source_format: analysis.format.name().to_string(),
            fingerprint: analysis.fingerprint.clone(),
            created_at,
        }
    }

    /// Write the package into `output` (created if missing).
    pub fn write(&self, analysis: &DocumentAnalysis, original: &[u8], output: &Path) -> Result<PackageHandle> {
        let content_dir = output.join("content");
        fs::create_dir_all(&content_dir)?;

        let mut files = Vec::new();
        let mut content_files = Vec::new();

        let metadata = self.metadata(analysis);
        write_file(output, "metadata.json", to_json(&metadata, self.options.json_format)?.as_bytes(), &mut files)?;

        write_file(
            output,
            "content/analysis.json",
            to_json(analysis, self.options.json_format)?.as_bytes(),
            &mut content_files,
        )?;
        write_file(output, "content/lesson.md", to_markdown(analysis).as_bytes(), &mut content_files)?;
        if !original.is_empty() {
            let name = format!("content/original.{}", analysis.format.extension());
            write_file(output, &name, original, &mut content_files)?;
        }

        let manifest = build_manifest(&metadata, &content_files)?;
        write_file(output, "imsmanifest.xml", manifest.as_bytes(), &mut files)?;
        files.extend(content_files);

        let archive = if self.options.zip {
            Some(write_archive(output, &files)?)
        } else {
            None
        };

        log::info!(
            "wrote package {} ({} files{})",
            output.display(),
            files.len(),
            if archive.is_some() { ", zipped" } else { "" }
        );

        Ok(PackageHandle {
            root: output.to_path_buf(),
            files,
            archive,
        })
    }
}

/// Write an LMS package with the given options and the current time.
pub fn to_lms_package(
    analysis: &DocumentAnalysis,
    original: &[u8],
    output: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<PackageHandle> {
    PackageWriter::new(options.clone()).write(analysis, original, output.as_ref())
}

fn package_identifier(analysis: &DocumentAnalysis) -> String {
    let short: String = analysis.fingerprint.chars().take(16).collect();
    if short.is_empty() {
        "eduparse-package".to_string()
    } else {
        format!("eduparse-{}", short)
    }
}

fn write_file(root: &Path, relative: &str, data: &[u8], files: &mut Vec<PathBuf>) -> Result<()> {
    fs::write(root.join(relative), data)?;
    files.push(PathBuf::from(relative));
    Ok(())
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Export(format!("manifest: {}", e))
}

fn build_manifest(metadata: &PackageMetadata, content_files: &[PathBuf]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut manifest = BytesStart::new("manifest");
    manifest.push_attribute(("identifier", metadata.identifier.as_str()));
    manifest.push_attribute(("version", "1.1"));
    manifest.push_attribute(("xmlns", MANIFEST_NS));
    writer.write_event(Event::Start(manifest)).map_err(xml_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("metadata")))
        .map_err(xml_error)?;
    write_simple_element(&mut writer, "schema", "IMS Content")?;
    write_simple_element(&mut writer, "schemaversion", "1.1.3")?;
    write_simple_element(&mut writer, "title", &metadata.title)?;
    writer
        .write_event(Event::End(BytesEnd::new("metadata")))
        .map_err(xml_error)?;

    let mut organizations = BytesStart::new("organizations");
    organizations.push_attribute(("default", "org-1"));
    writer.write_event(Event::Start(organizations)).map_err(xml_error)?;
    let mut organization = BytesStart::new("organization");
    organization.push_attribute(("identifier", "org-1"));
    writer.write_event(Event::Start(organization)).map_err(xml_error)?;
    write_simple_element(&mut writer, "title", &metadata.title)?;
    let mut item = BytesStart::new("item");
    item.push_attribute(("identifier", "item-1"));
    item.push_attribute(("identifierref", "res-1"));
    writer.write_event(Event::Start(item)).map_err(xml_error)?;
    write_simple_element(&mut writer, "title", &metadata.title)?;
    writer.write_event(Event::End(BytesEnd::new("item"))).map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("organization")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("organizations")))
        .map_err(xml_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("resources")))
        .map_err(xml_error)?;
    let mut resource = BytesStart::new("resource");
    resource.push_attribute(("identifier", "res-1"));
    resource.push_attribute(("type", "webcontent"));
    resource.push_attribute(("href", "content/lesson.md"));
    writer.write_event(Event::Start(resource)).map_err(xml_error)?;
    for file in std::iter::once(Path::new("metadata.json")).chain(content_files.iter().map(PathBuf::as_path)) {
        let href = file.to_string_lossy().replace('\\', "/");
        let mut elem = BytesStart::new("file");
        elem.push_attribute(("href", href.as_str()));
        writer.write_event(Event::Empty(elem)).map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("resource")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("resources")))
        .map_err(xml_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("manifest")))
        .map_err(xml_error)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(xml_error)
}

fn write_simple_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

/// Zip the package files into `<root>.zip`.
fn write_archive(root: &Path, files: &[PathBuf]) -> Result<PathBuf> {
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    let mut archive_path = root.as_os_str().to_owned();
    archive_path.push(".zip");
    let archive_path = PathBuf::from(archive_path);

    let zip_error = |e: zip::result::ZipError| Error::Export(format!("archive: {}", e));
    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let name = file.to_string_lossy().replace('\\', "/");
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(&fs::read(root.join(file))?)?;
    }
    zip.finish().map_err(zip_error)?;

    Ok(archive_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DocumentFormat;
    use crate::model::{DocumentBuilder, Question, QuestionOption};
    use chrono::TimeZone;
    use std::io::Read;

    fn analysis() -> DocumentAnalysis {
        let mut builder = DocumentBuilder::new(DocumentFormat::Text);
        builder.metadata_mut().title = Some("Fractions <Unit 2>".into());
        builder.push_paragraph("Halves and quarters of a whole.");
        let document = builder.finish(|_| Vec::new());

        let mut q1 = Question::new("1", "Which is larger?");
        q1.add_option(QuestionOption::new("A", "1/2"));
        q1.add_option(QuestionOption::new("B", "1/4"));

        DocumentAnalysis {
            fingerprint: "0123456789abcdef0123".into(),
            format: DocumentFormat::Text,
            document,
            document_type: DocumentType::Worksheet,
            questions: vec![q1],
            learning_objectives: vec!["Compare fractions".into()],
            concepts: vec!["fractions".into(), "halves".into()],
            enrichment: None,
            incomplete: false,
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_package_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pkg");
        let handle = PackageWriter::new(ExportOptions::default())
            .with_created_at(fixed_time())
            .write(&analysis(), b"Halves and quarters", &out)
            .unwrap();

        let names: Vec<String> = handle.files.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(
            names,
            vec![
                "metadata.json",
                "imsmanifest.xml",
                "content/analysis.json",
                "content/lesson.md",
                "content/original.txt",
            ]
        );
        for file in &handle.files {
            assert!(handle.path_of(file).exists());
        }
        assert!(handle.archive.is_none());

        let manifest = fs::read_to_string(out.join("imsmanifest.xml")).unwrap();
        assert!(manifest.contains("identifier=\"eduparse-0123456789abcdef\""));
        assert!(manifest.contains("Fractions &lt;Unit 2&gt;"));
        assert!(manifest.contains("<file href=\"content/lesson.md\"/>"));
        assert!(manifest.contains("<file href=\"metadata.json\"/>"));
    }

    #[test]
    fn test_metadata_deterministic_except_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PackageWriter::new(ExportOptions::default()).with_created_at(fixed_time());
        let a = writer.write(&analysis(), b"", &dir.path().join("a")).unwrap();
        let b = writer.write(&analysis(), b"", &dir.path().join("b")).unwrap();

        let read = |h: &PackageHandle, f: &str| fs::read(h.path_of(f)).unwrap();
        assert_eq!(read(&a, "metadata.json"), read(&b, "metadata.json"));
        assert_eq!(read(&a, "imsmanifest.xml"), read(&b, "imsmanifest.xml"));
        assert!(!a.files.iter().any(|f| f.starts_with("content/original")));

        let later = PackageWriter::new(ExportOptions::default())
            .with_created_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let m1 = writer.metadata(&analysis());
        let m2 = later.metadata(&analysis());
        assert_ne!(m1.created_at, m2.created_at);
        assert_eq!(
            PackageMetadata { created_at: m2.created_at, ..m1 },
            m2
        );
    }

    #[test]
    fn test_metadata_fields() {
        let meta = PackageWriter::new(ExportOptions::default())
            .with_created_at(fixed_time())
            .metadata(&analysis());
        assert_eq!(meta.title, "Fractions <Unit 2>");
        assert_eq!(meta.keywords, vec!["fractions", "halves"]);
        assert_eq!(meta.learning_objectives, vec!["Compare fractions"]);
        assert_eq!(meta.content_type, DocumentType::Worksheet);
        assert_eq!(meta.difficulty, Difficulty::Beginner);
        // One multiple-choice question plus a few words of reading.
        assert_eq!(meta.estimated_minutes, 2);
    }

    #[test]
    fn test_zip_archive() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pkg");
        let options = ExportOptions::default().with_zip(true);
        let handle = to_lms_package(&analysis(), b"raw", &out, &options).unwrap();

        let archive_path = handle.archive.unwrap();
        assert_eq!(archive_path, dir.path().join("pkg.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 5);
        let mut lesson = String::new();
        archive
            .by_name("content/lesson.md")
            .unwrap()
            .read_to_string(&mut lesson)
            .unwrap();
        assert!(lesson.starts_with("# Fractions <Unit 2>"));
    }

    #[test]
    fn test_difficulty_rises_with_essays() {
        let mut a = analysis();
        assert_eq!(estimate_difficulty(&a), Difficulty::Beginner);

        a.questions = (1..=4)
            .map(|i| {
                let mut q = Question::new(i.to_string(), "Discuss at length.");
                q.set_type(QuestionType::Essay);
                q
            })
            .collect();
        a.document.math_regions.push(crate::model::Span::new(0, 3));
        assert_eq!(estimate_difficulty(&a), Difficulty::Advanced);
        assert_eq!(estimate_minutes(&a, 5.0), 21);
    }
}

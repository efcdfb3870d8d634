//! DOCX document parser.
//!
//! Reads `word/document.xml` with quick-xml. Heading levels come from
//! paragraph style names, tables from `w:tbl` markup, metadata from
//! `docProps/core.xml` and figures from `word/media`.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::detect::DocumentFormat;
use crate::error::{Error, Result};
use crate::model::{
    DocumentBuilder, FigureRef, Heading, Metadata, NormalizedDocument, TableBlock, TableContext,
    TableMethod,
};

use super::math::detect_math_regions;
use super::options::ParseOptions;
use super::DocumentParser;

/// Characters per printed page used for page estimates.
const CHARS_PER_PAGE: f32 = 3000.0;

/// DOCX parser.
#[derive(Debug, Default)]
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for DocxParser {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Docx
    }

    fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<NormalizedDocument> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let document_xml = read_entry(&mut archive, "word/document.xml")?
            .ok_or_else(|| Error::CorruptDocument("docx: missing word/document.xml".into()))?;
        let styles = match read_entry(&mut archive, "word/styles.xml")? {
            Some(xml) => parse_styles(&xml)?,
            None => HashMap::new(),
        };
        let relationships = match read_entry(&mut archive, "word/_rels/document.xml.rels")? {
            Some(xml) => parse_image_relationships(&xml)?,
            None => HashMap::new(),
        };

        let body = parse_body(&document_xml)?;
        log::debug!(
            "docx: {} body items, {} image references",
            body.items.len(),
            body.image_refs.len()
        );

        let mut builder = DocumentBuilder::new(DocumentFormat::Docx);
        if let Some(xml) = read_entry(&mut archive, "docProps/core.xml")? {
            apply_core_properties(builder.metadata_mut(), &xml)?;
        }

        let mut chars = 0usize;
        let mut table_count = 0usize;
        for (index, item) in body.items.iter().enumerate() {
            match item {
                BodyItem::Paragraph { style, text } => {
                    chars += text.chars().count();
                    let level = style
                        .as_deref()
                        .map(|id| styles.get(id).map(String::as_str).unwrap_or(id))
                        .and_then(heading_level);
                    match level {
                        Some(level) => builder.push_heading(Heading::new(level, text.trim())),
                        None => builder.push_paragraph(text),
                    }
                }
                BodyItem::Table(rows) if options.extract_tables => {
                    table_count += 1;
                    chars += rows.iter().flatten().map(|c| c.chars().count()).sum::<usize>();
                    let mut table = TableBlock::new(
                        format!("table-{}", table_count),
                        rows.clone(),
                        TableMethod::Native,
                    );
                    table.context = TableContext {
                        before: body.items[..index].iter().rev().find_map(BodyItem::body_text),
                        after: body.items[index + 1..].iter().find_map(BodyItem::body_text),
                    };
                    builder.push_table(table);
                }
                BodyItem::Table(rows) => {
                    // Tables still contribute their text when not extracted as structure.
                    for row in rows {
                        builder.push_paragraph(row.join("\t"));
                    }
                }
            }
        }

        let estimated = (chars as f32 / CHARS_PER_PAGE + table_count as f32 * 0.5).max(1.0);
        builder.metadata_mut().estimated_pages = Some(estimated);

        if options.extract_figures {
            for figure in collect_figures(&archive, &body.image_refs, &relationships) {
                builder.push_figure(figure);
            }
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

/// Heading level from a style id or name: `Heading2`, `heading 2` -> 2, bare `Heading` -> 1.
fn heading_level(style: &str) -> Option<u8> {
    let normalized: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let rest = normalized.strip_prefix("heading")?;
    if rest.is_empty() {
        return Some(1);
    }
    rest.parse::<u8>().ok().filter(|n| *n >= 1).map(|n| n.min(6))
}

#[derive(Debug)]
enum BodyItem {
    Paragraph { style: Option<String>, text: String },
    Table(Vec<Vec<String>>),
}

impl BodyItem {
    fn body_text(&self) -> Option<String> {
        match self {
            BodyItem::Paragraph { text, .. } if !text.trim().is_empty() => {
                Some(text.trim().to_string())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct DocxBody {
    items: Vec<BodyItem>,
    /// Relationship ids of embedded images, in order of first reference
    image_refs: Vec<String>,
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_body(xml: &str) -> Result<DocxBody> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut body = DocxBody::default();
    let mut seen_refs: HashSet<String> = HashSet::new();

    let mut paragraph = String::new();
    let mut style: Option<String> = None;
    let mut in_text = false;

    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    paragraph.clear();
                    style = None;
                }
                b"w:t" | b"m:t" => in_text = true,
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"w:tr" if table_depth == 1 => row.clear(),
                b"w:tc" if table_depth == 1 => cell.clear(),
                _ => inline_element(&e, &mut paragraph, &mut style, &mut body, &mut seen_refs)?,
            },
            Event::Empty(e) => {
                inline_element(&e, &mut paragraph, &mut style, &mut body, &mut seen_refs)?
            }
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" | b"m:t" => in_text = false,
                b"w:p" => {
                    let text = std::mem::take(&mut paragraph);
                    if table_depth > 0 {
                        let text = text.trim();
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(text);
                        }
                    } else {
                        body.items.push(BodyItem::Paragraph {
                            style: style.take(),
                            text,
                        });
                    }
                }
                b"w:tc" if table_depth == 1 => row.push(std::mem::take(&mut cell)),
                b"w:tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"w:tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        body.items.push(BodyItem::Table(std::mem::take(&mut rows)));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(body)
}

/// Elements that may appear as either start or empty tags inside a paragraph.
fn inline_element(
    e: &BytesStart<'_>,
    paragraph: &mut String,
    style: &mut Option<String>,
    body: &mut DocxBody,
    seen_refs: &mut HashSet<String>,
) -> Result<()> {
    match e.name().as_ref() {
        b"w:pStyle" => *style = attr(e, b"w:val")?,
        b"w:tab" => paragraph.push('\t'),
        b"w:br" | b"w:cr" => paragraph.push('\n'),
        b"a:blip" => {
            if let Some(id) = attr(e, b"r:embed")? {
                if seen_refs.insert(id.clone()) {
                    body.image_refs.push(id);
                }
            }
        }
        b"v:imagedata" => {
            if let Some(id) = attr(e, b"r:id")? {
                if seen_refs.insert(id.clone()) {
                    body.image_refs.push(id);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Map of style id to style name.
fn parse_styles(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut styles = HashMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"w:style" => {
                current = attr(&e, b"w:styleId")?;
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"w:name" => {
                if let (Some(id), Some(name)) = (current.as_ref(), attr(&e, b"w:val")?) {
                    styles.insert(id.clone(), name);
                }
            }
            Event::End(e) if e.name().as_ref() == b"w:style" => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(styles)
}

/// Map of relationship id to target for image relationships.
fn parse_image_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                let is_image = attr(&e, b"Type")?.is_some_and(|t| t.ends_with("/image"));
                if let (true, Some(id), Some(target)) =
                    (is_image, attr(&e, b"Id")?, attr(&e, b"Target")?)
                {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

fn apply_core_properties(metadata: &mut Metadata, xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => field = Some(e.name().as_ref().to_vec()),
            Event::End(_) => field = None,
            Event::Text(t) => {
                let value = t.unescape()?.trim().to_string();
                if value.is_empty() {
                    buf.clear();
                    continue;
                }
                match field.as_deref() {
                    Some(b"dc:title") => metadata.title = Some(value),
                    Some(b"dc:creator") => metadata.author = Some(value),
                    Some(b"dc:subject") => metadata.subject = Some(value),
                    Some(b"dc:language") => metadata.language = Some(value),
                    Some(b"cp:keywords") => {
                        metadata.keywords = value
                            .split([',', ';'])
                            .map(str::trim)
                            .filter(|k| !k.is_empty())
                            .map(str::to_string)
                            .collect();
                    }
                    Some(b"dcterms:created") => metadata.created = parse_w3c_date(&value),
                    Some(b"dcterms:modified") => metadata.modified = parse_w3c_date(&value),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_w3c_date(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Figures in order of first reference, then unreferenced media entries.
fn collect_figures(
    archive: &ZipArchive<Cursor<&[u8]>>,
    image_refs: &[String],
    relationships: &HashMap<String, String>,
) -> Vec<FigureRef> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut figures = Vec::new();

    let referenced = image_refs
        .iter()
        .filter_map(|id| relationships.get(id))
        .map(|target| format!("word/{}", target.trim_start_matches("/word/").trim_start_matches('/')));
    let mut media: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("word/media/"))
        .map(str::to_string)
        .collect();
    media.sort();

    for path in referenced.chain(media) {
        if !seen.insert(path.clone()) {
            continue;
        }
        let Some(stem) = Path::new(&path).file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        figures.push(FigureRef::new(stem));
    }

    figures
}

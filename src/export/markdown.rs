//! Markdown rendering for analyses.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{DocumentAnalysis, NormalizedDocument, OutlineItem, Question, TableBlock};

/// What the Markdown renderer includes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Emit the metadata table under the title
    pub include_metadata: bool,
    /// Emit extraction warnings at the end
    pub include_warnings: bool,
    /// Escape Markdown control characters in document text
    pub escape_special_chars: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            include_warnings: true,
            escape_special_chars: true,
        }
    }
}

/// Convert an analysis to Markdown with default options.
pub fn to_markdown(analysis: &DocumentAnalysis) -> String {
    MarkdownRenderer::new(MarkdownOptions::default()).render(analysis)
}

/// Convert a bare normalized document (no analysis sections) to Markdown.
pub fn document_to_markdown(doc: &NormalizedDocument) -> String {
    let renderer = MarkdownRenderer::new(MarkdownOptions::default());
    let mut output = String::new();
    output.push_str(&format!("# {}\n\n", renderer.escape(doc.metadata.display_title(doc))));
    renderer.render_body(&mut output, doc);
    renderer.render_warnings(&mut output, doc);
    finish(output)
}

/// Markdown renderer.
pub struct MarkdownRenderer {
    options: MarkdownOptions,
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    /// Render an analysis to Markdown.
    pub fn render(&self, analysis: &DocumentAnalysis) -> String {
        let doc = &analysis.document;
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", self.escape(analysis.title())));
        if self.options.include_metadata {
            self.render_metadata(&mut output, analysis);
        }

        self.render_body(&mut output, doc);

        if !analysis.questions.is_empty() {
            output.push_str("## Questions\n\n");
            for question in &analysis.questions {
                self.render_question(&mut output, question);
            }
        }

        self.render_list(&mut output, "Learning Objectives", &analysis.learning_objectives);
        self.render_list(&mut output, "Key Concepts", &analysis.concepts);

        if let Some(enrichment) = &analysis.enrichment {
            if let Some(summary) = &enrichment.summary {
                output.push_str("## Summary\n\n");
                output.push_str(&self.escape(summary));
                output.push_str("\n\n");
            }
            self.render_list(&mut output, "Suggested Activities", &enrichment.suggested_activities);
        }

        self.render_warnings(&mut output, doc);
        if analysis.incomplete {
            output.push_str("> Enrichment unavailable; structural analysis only.\n\n");
        }

        finish(output)
    }

    fn render_metadata(&self, output: &mut String, analysis: &DocumentAnalysis) {
        let doc = &analysis.document;
        let meta = &doc.metadata;
        let mut rows: Vec<(&str, String)> = vec![
            ("Format", analysis.format.name().to_string()),
            ("Document type", analysis.document_type.to_string()),
        ];
        if let Some(author) = &meta.author {
            rows.push(("Author", author.clone()));
        }
        if let Some(subject) = &meta.subject {
            rows.push(("Subject", subject.clone()));
        }
        if !meta.keywords.is_empty() {
            rows.push(("Keywords", meta.keywords.join(", ")));
        }
        if let Some(pages) = meta.page_count {
            rows.push(("Pages", pages.to_string()));
        } else if let Some(pages) = meta.estimated_pages {
            rows.push(("Pages (estimated)", format!("{:.1}", pages)));
        }
        if let (Some(w), Some(h)) = (meta.width, meta.height) {
            rows.push(("Dimensions", format!("{}x{}", w, h)));
        }
        if let Some(language) = &meta.language {
            rows.push(("Language", language.clone()));
        }
        if let Some(created) = meta.created {
            rows.push(("Created", created.format("%Y-%m-%d").to_string()));
        }
        rows.push(("Words", doc.word_count().to_string()));
        rows.push(("Questions", analysis.questions.len().to_string()));

        output.push_str("| Field | Value |\n| --- | --- |\n");
        for (field, value) in rows {
            output.push_str(&format!("| {} | {} |\n", field, self.cell(&value)));
        }
        output.push('\n');
    }

    /// Outline-ordered body: preamble, then headings with their paragraphs
    /// and tables. Tables not attached to any heading follow at the end.
    fn render_body(&self, output: &mut String, doc: &NormalizedDocument) {
        let mut rendered_tables = BTreeSet::new();

        if doc.outline.is_empty() {
            for paragraph in &doc.paragraphs {
                self.render_paragraph(output, paragraph);
            }
        } else {
            for &idx in &doc.outline.preamble {
                if let Some(paragraph) = doc.paragraphs.get(idx) {
                    self.render_paragraph(output, paragraph);
                }
            }
            for item in &doc.outline.items {
                self.render_outline_item(output, doc, item, &mut rendered_tables);
            }
        }

        for (idx, table) in doc.tables.iter().enumerate() {
            if !rendered_tables.contains(&idx) {
                self.render_table(output, table);
            }
        }
    }

    fn render_outline_item(
        &self,
        output: &mut String,
        doc: &NormalizedDocument,
        item: &OutlineItem,
        rendered_tables: &mut BTreeSet<usize>,
    ) {
        // The document title occupies level 1.
        let level = (item.level as usize + 1).clamp(2, 6);
        output.push_str(&"#".repeat(level));
        output.push(' ');
        output.push_str(&self.escape(&item.title));
        output.push_str("\n\n");

        for &idx in &item.paragraphs {
            if let Some(paragraph) = doc.paragraphs.get(idx) {
                self.render_paragraph(output, paragraph);
            }
        }
        for &idx in &item.tables {
            if let Some(table) = doc.tables.get(idx) {
                self.render_table(output, table);
                rendered_tables.insert(idx);
            }
        }
        for child in &item.children {
            self.render_outline_item(output, doc, child, rendered_tables);
        }
    }

    fn render_paragraph(&self, output: &mut String, paragraph: &str) {
        let text = paragraph.trim();
        if text.is_empty() {
            return;
        }
        // Hard line breaks inside a paragraph are kept.
        let lines: Vec<String> = text.lines().map(|l| self.escape(l.trim_end())).collect();
        output.push_str(&lines.join("  \n"));
        output.push_str("\n\n");
    }

    fn render_table(&self, output: &mut String, table: &TableBlock) {
        let cols = table.column_count();
        if table.is_empty() || cols == 0 {
            return;
        }

        for (i, row) in table.rows.iter().enumerate() {
            output.push('|');
            for c in 0..cols {
                let cell = row.get(c).map(String::as_str).unwrap_or("");
                output.push_str(&format!(" {} |", self.cell(cell)));
            }
            output.push('\n');

            if i == 0 {
                output.push('|');
                output.push_str(&" --- |".repeat(cols));
                output.push('\n');
            }
        }
        output.push('\n');
    }

    fn render_question(&self, output: &mut String, question: &Question) {
        output.push_str(&format!(
            "**{}.** {} _({})_\n",
            question.number,
            self.escape(&question.text),
            question.question_type
        ));
        for option in &question.options {
            output.push_str(&format!("- {}. {}\n", option.label, self.escape(&option.text)));
        }
        output.push('\n');
    }

    fn render_list(&self, output: &mut String, title: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        output.push_str(&format!("## {}\n\n", title));
        for item in items {
            output.push_str("- ");
            output.push_str(&self.escape(item));
            output.push('\n');
        }
        output.push('\n');
    }

    fn render_warnings(&self, output: &mut String, doc: &NormalizedDocument) {
        if !self.options.include_warnings || doc.warnings.is_empty() {
            return;
        }
        output.push_str("## Extraction Warnings\n\n");
        for warning in &doc.warnings {
            output.push_str(&format!("- {}\n", warning));
        }
        output.push('\n');
    }

    fn cell(&self, text: &str) -> String {
        let text = text.replace('\n', " ");
        if self.options.escape_special_chars {
            escape_markdown(text.trim())
        } else {
            text.trim().replace('|', "\\|")
        }
    }

    fn escape(&self, text: &str) -> String {
        if self.options.escape_special_chars {
            escape_markdown(text)
        } else {
            text.to_string()
        }
    }
}

fn finish(mut output: String) -> String {
    let trimmed = output.trim_end().len();
    output.truncate(trimmed);
    output.push('\n');
    output
}

fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '|' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

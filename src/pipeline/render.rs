//! Rendering: turn a [`NotesDocument`] into Markdown, JSON or a Word file.
//!
//! Renderers only look at a record's kind and text. Kinds outside the four
//! the prompts ask for are rendered as plain paragraphs.
//!
//! Word formatting (sizes in points, spacing before/after in points):
//!
//! | Kind | Size | Weight | Alignment | Spacing |
//! |------|------|--------|-----------|---------|
//! | heading | 16 | bold | center | 48 / 36 |
//! | subheading | 14 | bold | left | 36 / 24 |
//! | paragraph | 12 | normal | justified | 24 / 24 |
//! | bullet | 12 | normal | left, 18 pt indent | 24 / 28 |

use crate::config::OutputFormat;
use crate::error::NotesError;
use crate::output::{NoteKind, NotesDocument};
use docx_rs::{AlignmentType, Docx, LineSpacing, Paragraph, Run, RunFonts};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Seek, Write};

const FONT: &str = "Times New Roman";

/// `**bold**` spans inside record text.
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());

/// Render the document in the requested format.
pub fn render(doc: &NotesDocument, format: OutputFormat) -> Result<Vec<u8>, NotesError> {
    match format {
        OutputFormat::Markdown => Ok(render_markdown(doc).into_bytes()),
        OutputFormat::Json => render_json(doc).map(String::into_bytes),
        OutputFormat::Docx => {
            let mut buf = Cursor::new(Vec::new());
            render_docx(doc, &mut buf)?;
            Ok(buf.into_inner())
        }
    }
}

// ── Markdown ─────────────────────────────────────────────────────────────

/// Render as Markdown: `#` headings, `##` subheadings, `-` bullets, and
/// everything else as a paragraph. Blocks are separated by a blank line.
pub fn render_markdown(doc: &NotesDocument) -> String {
    if doc.is_empty() {
        return String::new();
    }

    let blocks: Vec<String> = doc
        .iter()
        .map(|record| {
            let text = record.text.trim();
            match record.kind {
                NoteKind::Heading => format!("# {}", single_line(text)),
                NoteKind::Subheading => format!("## {}", single_line(text)),
                NoteKind::Bullet => format!("- {}", text),
                _ => text.to_string(),
            }
        })
        .collect();

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── JSON ─────────────────────────────────────────────────────────────────

/// Render as a pretty-printed JSON array of `{kind, text}` objects.
pub fn render_json(doc: &NotesDocument) -> Result<String, NotesError> {
    serde_json::to_string_pretty(doc).map_err(|e| NotesError::RenderFailed {
        format: OutputFormat::Json.to_string(),
        detail: e.to_string(),
    })
}

// ── DOCX ─────────────────────────────────────────────────────────────────

struct BlockStyle {
    size_pt: usize,
    bold: bool,
    align: AlignmentType,
    before_pt: u32,
    after_pt: u32,
    indent_pt: Option<i32>,
}

fn block_style(kind: &NoteKind) -> BlockStyle {
    match kind {
        NoteKind::Heading => BlockStyle {
            size_pt: 16,
            bold: true,
            align: AlignmentType::Center,
            before_pt: 48,
            after_pt: 36,
            indent_pt: None,
        },
        NoteKind::Subheading => BlockStyle {
            size_pt: 14,
            bold: true,
            align: AlignmentType::Left,
            before_pt: 36,
            after_pt: 24,
            indent_pt: None,
        },
        NoteKind::Bullet => BlockStyle {
            size_pt: 12,
            bold: false,
            align: AlignmentType::Left,
            before_pt: 24,
            after_pt: 28,
            indent_pt: Some(18),
        },
        _ => BlockStyle {
            size_pt: 12,
            bold: false,
            align: AlignmentType::Both,
            before_pt: 24,
            after_pt: 24,
            indent_pt: None,
        },
    }
}

/// Render as a Word document written to `writer`.
pub fn render_docx<W: Write + Seek>(doc: &NotesDocument, writer: W) -> Result<(), NotesError> {
    let mut docx = Docx::new();
    for record in doc {
        let text = match record.kind {
            NoteKind::Bullet => format!("• {}", record.text.trim()),
            _ => record.text.trim().to_string(),
        };
        docx = docx.add_paragraph(docx_paragraph(&text, &block_style(&record.kind)));
    }

    docx.build()
        .pack(writer)
        .map_err(|e| NotesError::RenderFailed {
            format: OutputFormat::Docx.to_string(),
            detail: e.to_string(),
        })
}

fn docx_paragraph(text: &str, style: &BlockStyle) -> Paragraph {
    let mut paragraph = Paragraph::new().align(style.align).line_spacing(
        LineSpacing::new()
            .before(style.before_pt * 20)
            .after(style.after_pt * 20),
    );
    if let Some(indent) = style.indent_pt {
        paragraph = paragraph.indent(Some(indent * 20), None, None, None);
    }

    for (span, bold) in inline_spans(text) {
        // Sizes are in half-points.
        let mut run = Run::new()
            .add_text(span)
            .size(style.size_pt * 2)
            .fonts(RunFonts::new().ascii(FONT).hi_ansi(FONT).cs(FONT));
        if bold || style.bold {
            run = run.bold();
        }
        paragraph = paragraph.add_run(run);
    }
    paragraph
}

/// Split text into `(span, is_bold)` pieces on `**bold**` markers.
pub fn inline_spans(text: &str) -> Vec<(&str, bool)> {
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in BOLD_RE.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push((&text[last..whole.start()], false));
        }
        spans.push((inner.as_str(), true));
        last = whole.end();
    }
    if last < text.len() {
        spans.push((&text[last..], false));
    }
    spans
}

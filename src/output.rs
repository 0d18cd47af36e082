//! Data model shared by every pipeline stage and the renderers.
//!
//! The only contract between the pipeline and a rendering backend is the
//! shape of [`NoteRecord`]: a `kind` tag and a `text` body. Everything else in
//! this module is bookkeeping for callers (stats, skipped sections).

use crate::error::SectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Sections ─────────────────────────────────────────────────────────────

/// One logical unit of the source document: a heading and its body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub heading: String,
    pub body: String,
}

impl DocumentSection {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }
}

/// Build a section list from `(heading, body)` pairs, keeping the first
/// position of each heading and the last body seen for it.
///
/// This is the same rule a JSON object with duplicate keys follows when
/// parsed with insertion order preserved, so hand-built and extracted section
/// lists behave identically.
pub fn sections_from_pairs<I, H, B>(pairs: I) -> Vec<DocumentSection>
where
    I: IntoIterator<Item = (H, B)>,
    H: Into<String>,
    B: Into<String>,
{
    let mut sections: Vec<DocumentSection> = Vec::new();
    for (heading, body) in pairs {
        let heading = heading.into();
        let body = body.into();
        match sections.iter_mut().find(|s| s.heading == heading) {
            Some(existing) => existing.body = body,
            None => sections.push(DocumentSection { heading, body }),
        }
    }
    sections
}

/// Unprocessed model text for one section's note-generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSectionResponse {
    /// 1-indexed position of the originating section.
    pub section: usize,
    pub heading: String,
    pub text: String,
}

// ── Note records ─────────────────────────────────────────────────────────

/// The kind tag of a note record.
///
/// The four kinds the prompts ask for have dedicated variants. Anything else
/// the model produces is kept verbatim in [`NoteKind::Other`] so renderers can
/// decide how to show it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoteKind {
    Heading,
    Subheading,
    Paragraph,
    Bullet,
    /// Assigned when a record carries text but no type information at all.
    Note,
    Other(String),
}

impl NoteKind {
    pub fn as_str(&self) -> &str {
        match self {
            NoteKind::Heading => "heading",
            NoteKind::Subheading => "subheading",
            NoteKind::Paragraph => "paragraph",
            NoteKind::Bullet => "bullet",
            NoteKind::Note => "note",
            NoteKind::Other(s) => s,
        }
    }

    /// True when the tag is blank after trimming.
    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<&str> for NoteKind {
    fn from(s: &str) -> Self {
        match s {
            "heading" => NoteKind::Heading,
            "subheading" => NoteKind::Subheading,
            "paragraph" => NoteKind::Paragraph,
            "bullet" => NoteKind::Bullet,
            "note" => NoteKind::Note,
            other => NoteKind::Other(other.to_string()),
        }
    }
}

impl From<String> for NoteKind {
    fn from(s: String) -> Self {
        NoteKind::from(s.as_str())
    }
}

impl From<NoteKind> for String {
    fn from(k: NoteKind) -> Self {
        k.as_str().to_string()
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed unit of generated study-note content.
///
/// `text` may contain inline `**bold**` markers which renderers interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(alias = "type")]
    pub kind: NoteKind,
    pub text: String,
}

impl NoteRecord {
    pub fn new(kind: impl Into<NoteKind>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }

    /// A record is valid when both its kind and its text are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.kind.is_blank() && !self.text.trim().is_empty()
    }
}

/// The final artifact: note records in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotesDocument {
    records: Vec<NoteRecord>,
}

impl NotesDocument {
    /// Wrap records, dropping any that are not [`NoteRecord::is_valid`].
    pub fn new(records: Vec<NoteRecord>) -> Self {
        Self {
            records: records.into_iter().filter(NoteRecord::is_valid).collect(),
        }
    }

    pub fn records(&self) -> &[NoteRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NoteRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NoteRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a NotesDocument {
    type Item = &'a NoteRecord;
    type IntoIter = std::slice::Iter<'a, NoteRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ── Metering ─────────────────────────────────────────────────────────────

/// Token counts reported by one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

// ── Run output ───────────────────────────────────────────────────────────

/// Everything a full notes run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesOutput {
    /// The recovered note records.
    pub document: NotesDocument,
    /// The document rendered as Markdown.
    pub markdown: String,
    /// Sections that never reached the repair stage (too short, failed calls).
    pub skipped: Vec<SectionError>,
    /// Sections whose response could not be repaired into any record.
    pub unrecovered: Vec<SectionError>,
    pub stats: NotesStats,
}

impl NotesOutput {
    /// True when at least one section was lost along the way.
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty() || !self.unrecovered.is_empty()
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotesStats {
    /// Sections returned by extraction (or supplied by the caller).
    pub total_sections: usize,
    /// Sections whose generation call produced text.
    pub processed_sections: usize,
    /// Sections skipped before or during generation.
    pub skipped_sections: usize,
    /// Sections whose response yielded zero records.
    pub unrecovered_sections: usize,
    /// Sections recovered through tolerant repair rather than strict parsing.
    pub repaired_sections: usize,
    /// Records in the final document.
    pub record_count: usize,
    /// Records dropped for a blank kind or text.
    pub dropped_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extraction_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
}

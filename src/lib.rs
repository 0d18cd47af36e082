//! # notescraft
//!
//! Turn PDF and DOCX documents into structured study notes with a large
//! language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / DOCX
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, size + format check
//!  ├─ 2. Extract   one call: document bytes → {heading: body, ...}
//!  ├─ 3. Generate  one call per section → raw JSON-ish note records
//!  ├─ 4. Repair    strip fences, strict parse, tolerant field scan, validate
//!  └─ 5. Render    Markdown / JSON / Word
//! ```
//!
//! Model output is not trusted to be well-formed. A section whose response
//! cannot be repaired costs only that section; a run fails only when nothing
//! at all could be recovered.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notescraft::{generate_notes, NotesConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = NotesConfig::default();
//!     let output = generate_notes("chapter1.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     if output.is_degraded() {
//!         eprintln!("{} sections skipped", output.skipped.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notescraft` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! notescraft = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod notes;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{NoteStyle, NotesConfig, NotesConfigBuilder, OutputFormat};
pub use error::{classify_error, ErrorKind, ErrorReport, NotesError, SectionError, Stage};
pub use notes::{
    extract_sections, generate_notes, generate_notes_from_bytes, generate_notes_sync,
    generate_notes_to_file, notes_from_sections, resolve_model, write_atomic, ProcessingOutcome,
};
pub use output::{
    DocumentSection, NoteKind, NoteRecord, NotesDocument, NotesOutput, NotesStats,
    RawSectionResponse, TokenUsage,
};
pub use pipeline::input::DocumentFormat;
pub use pipeline::llm::{LanguageModel, ModelError, ModelReply, ModelRequest};
pub use pipeline::render::{render_docx, render_json, render_markdown};
pub use pipeline::repair::repair_and_merge;
pub use progress::{NoopProgressCallback, NotesProgressCallback, ProgressCallback, UsageStage};
pub use stream::{generate_stream, stream_notes, SectionNotes, SectionStream};

//! Streaming API: emit each section's notes as soon as they are ready.
//!
//! Unlike [`crate::notes::generate_notes`], which returns only after every
//! section is done, [`generate_stream`] yields one item per section. Items
//! arrive in section order even with `concurrency > 1`. Each section's
//! response is repaired on its own, so a caller can render notes
//! progressively.
//!
//! An authentication failure is yielded as a [`SectionError::CallFailed`]
//! and ends the stream.
//!
//! The stream has no document-level outcome. When every section fails, it
//! yields only `Err` items, one per section. A caller that needs
//! [`NotesError::NoContentProduced`] or
//! [`NotesError::AllSectionsUnrecoverable`] must track whether any `Ok` item
//! arrived, or use [`crate::notes::notes_from_sections`] instead.

use crate::config::NotesConfig;
use crate::error::{NotesError, SectionError};
use crate::notes::resolve_model;
use crate::output::{DocumentSection, NoteRecord, TokenUsage};
use crate::pipeline::generate::generate_section;
use crate::pipeline::repair::{recover_response, Recovery};
use crate::pipeline::{extract, input};
use crate::progress::notify;
use futures::future;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// Notes recovered from one section's response.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionNotes {
    /// 1-indexed position of the section.
    pub section: usize,
    pub heading: String,
    pub records: Vec<NoteRecord>,
    /// True when the records came from tolerant repair.
    pub repaired: bool,
    pub dropped_records: usize,
    pub usage: TokenUsage,
}

/// A boxed stream of per-section results.
pub type SectionStream = Pin<Box<dyn Stream<Item = Result<SectionNotes, SectionError>> + Send>>;

/// Generate notes for `sections`, streaming one result per section.
///
/// Every section yields exactly one item unless an authentication failure
/// ends the stream early. A run in which every section failed is not
/// reported as a separate item.
///
/// # Errors
/// Returns `Err(NotesError)` only when no model can be resolved.
pub fn generate_stream(
    sections: Vec<DocumentSection>,
    config: &NotesConfig,
) -> Result<SectionStream, NotesError> {
    let model = resolve_model(config)?;
    let total = sections.len();
    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(sections.into_iter().enumerate())
        .map(move |(i, section)| {
            let model = Arc::clone(&model);
            let cfg = config.clone();
            async move {
                let (response, usage) =
                    generate_section(model.as_ref(), i + 1, total, &section, &cfg).await?;
                let recovered = recover_response(&response);
                match recovered.recovery {
                    Recovery::Unrecovered => Err(SectionError::Unrecoverable {
                        section: response.section,
                        heading: response.heading,
                    }),
                    recovery => Ok(SectionNotes {
                        section: response.section,
                        heading: response.heading,
                        records: recovered.records,
                        repaired: recovery == Recovery::Repaired,
                        dropped_records: recovered.dropped,
                        usage,
                    }),
                }
            }
        })
        .buffered(concurrency)
        .scan(false, |halted, item| {
            if *halted {
                return future::ready(None);
            }
            if matches!(&item, Err(e) if e.is_fatal()) {
                *halted = true;
            }
            future::ready(Some(item))
        });

    Ok(Box::pin(s))
}

/// Resolve and extract `input_str`, then stream notes for its sections.
///
/// Extraction happens before this returns, so its failures are fatal errors
/// rather than stream items.
///
/// # Example
/// ```rust,no_run
/// use notescraft::{stream_notes, NotesConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = NotesConfig::default();
/// let mut notes = stream_notes("chapter1.pdf", &config).await?;
/// while let Some(section) = notes.next().await {
///     match section {
///         Ok(s) => println!("{}: {} records", s.heading, s.records.len()),
///         Err(e) => eprintln!("skipped: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn stream_notes(
    input_str: impl AsRef<str>,
    config: &NotesConfig,
) -> Result<SectionStream, NotesError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming notes run: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let document = input::load_document(resolved.path(), config.max_file_size_mb).await?;
    let model = resolve_model(config)?;

    notify(config.progress_callback.as_ref(), |c| {
        c.on_extraction_start(&document.name)
    });
    let extraction = extract::extract(
        model.as_ref(),
        &document.bytes,
        document.format.mime_type(),
        config,
    )
    .await?;

    generate_stream(extraction.sections, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::ScriptedModel;

    const BODY: &str = "A body comfortably longer than the threshold.";

    fn config(model: ScriptedModel, concurrency: usize) -> NotesConfig {
        NotesConfig::builder()
            .language_model(Arc::new(model))
            .concurrency(concurrency)
            .build()
            .unwrap()
    }

    fn sections(headings: &[&str]) -> Vec<DocumentSection> {
        headings
            .iter()
            .map(|h| DocumentSection::new(*h, BODY))
            .collect()
    }

    fn heading_of(prompt: &str) -> String {
        prompt.lines().next().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn items_arrive_in_section_order() {
        let model = ScriptedModel::new(|req| {
            Ok(format!(
                r#"[{{"type": "heading", "text": "{}"}}]"#,
                heading_of(req.prompt)
            ))
        });
        let items: Vec<_> = generate_stream(sections(&["A", "B", "C", "D"]), &config(model, 3))
            .unwrap()
            .collect()
            .await;
        let headings: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().records[0].text.clone())
            .collect();
        assert_eq!(headings, ["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn unrecoverable_and_repaired_sections_are_reported() {
        let model = ScriptedModel::new(|req| match heading_of(req.prompt).as_str() {
            "A" => Ok("no json here".to_string()),
            _ => Ok(r#""type": "bullet", "text": "x" - "type": "bullet", "text": "y""#.to_string()),
        });
        let items: Vec<_> = generate_stream(sections(&["A", "B"]), &config(model, 1))
            .unwrap()
            .collect()
            .await;
        assert!(matches!(
            items[0],
            Err(SectionError::Unrecoverable { section: 1, .. })
        ));
        let b = items[1].as_ref().unwrap();
        assert!(b.repaired);
        assert_eq!(b.records.len(), 2);
    }

    #[tokio::test]
    async fn total_failure_yields_one_error_per_section() {
        let model = ScriptedModel::new(|req| match heading_of(req.prompt).as_str() {
            "A" => Err("connection reset".to_string()),
            _ => Ok("no notes here".to_string()),
        });
        let items: Vec<_> = generate_stream(sections(&["A", "B", "C"]), &config(model, 2))
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.is_err()));
        assert!(matches!(items[0], Err(SectionError::CallFailed { section: 1, .. })));
        assert!(matches!(items[2], Err(SectionError::Unrecoverable { section: 3, .. })));
    }

    #[tokio::test]
    async fn authentication_failure_ends_the_stream() {
        let model = ScriptedModel::new(|req| match heading_of(req.prompt).as_str() {
            "B" => Err("403 Forbidden".to_string()),
            _ => Ok(r#"[{"type": "paragraph", "text": "ok"}]"#.to_string()),
        });
        let items: Vec<_> = generate_stream(sections(&["A", "B", "C"]), &config(model, 1))
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap_err().is_fatal());
    }
}

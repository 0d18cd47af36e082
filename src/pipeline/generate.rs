//! Per-section note generation.
//!
//! One model call per section, issued through `buffered(concurrency)` so the
//! results come back in section order however the calls interleave. With the
//! default concurrency of 1 the calls are strictly sequential.
//!
//! A failing section costs only itself, with one exception: an authentication
//! failure stops the run, since every remaining call would fail the same way.

use crate::config::NotesConfig;
use crate::error::{NotesError, SectionError};
use crate::output::{DocumentSection, RawSectionResponse, TokenUsage};
use crate::pipeline::llm::{LanguageModel, ModelRequest};
use crate::progress::{notify, ProgressCallback, UsageStage};
use crate::prompts::section_prompt;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Raw responses plus everything that was skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// One response per section that produced text, in section order.
    pub responses: Vec<RawSectionResponse>,
    pub skipped: Vec<SectionError>,
    pub usage: TokenUsage,
}

/// Generate raw note responses for every section.
///
/// # Errors
/// - the stage-tagged authentication error, as soon as a call hits one
/// - [`NotesError::NoContentProduced`] when no section produced a response
pub async fn generate(
    model: &dyn LanguageModel,
    sections: &[DocumentSection],
    config: &NotesConfig,
) -> Result<Generation, NotesError> {
    let total = sections.len();
    info!("Generating notes for {} sections", total);

    let mut calls = stream::iter(
        sections
            .iter()
            .enumerate()
            .map(|(i, section)| generate_section(model, i + 1, total, section, config)),
    )
    .buffered(config.concurrency.max(1));

    let mut generation = Generation::default();
    while let Some(outcome) = calls.next().await {
        match outcome {
            Ok((response, usage)) => {
                generation.usage += usage;
                generation.responses.push(response);
            }
            Err(err) if err.is_fatal() => {
                warn!("Stopping generation: {}", err);
                return Err(err.into_fatal());
            }
            Err(err) => generation.skipped.push(err),
        }
    }

    if generation.responses.is_empty() {
        return Err(NotesError::NoContentProduced {
            detail: format!("none of the {total} sections produced a response"),
        });
    }

    info!(
        "Generation complete: {}/{} sections responded",
        generation.responses.len(),
        total
    );
    Ok(generation)
}

/// Generate the raw response for one section (1-indexed `section_num`).
///
/// Sections whose trimmed body is empty or shorter than
/// `config.min_section_chars` are skipped without a call.
pub async fn generate_section(
    model: &dyn LanguageModel,
    section_num: usize,
    total: usize,
    section: &DocumentSection,
    config: &NotesConfig,
) -> Result<(RawSectionResponse, TokenUsage), SectionError> {
    let callback = config.progress_callback.as_ref();
    let heading = section.heading.clone();

    let chars = section.body.trim().chars().count();
    if chars == 0 || chars < config.min_section_chars {
        return Err(skip(
            callback,
            total,
            SectionError::BelowThreshold {
                section: section_num,
                heading,
                chars,
                min: config.min_section_chars,
            },
        ));
    }

    notify(callback, |c| c.on_section_start(section_num, total, &heading));
    let prompt = section_prompt(&section.heading, &section.body);
    let request = ModelRequest::text(config.notes_system_prompt(), &prompt);

    let reply = match model.complete(request).await {
        Ok(reply) => reply,
        Err(e) => {
            return Err(skip(
                callback,
                total,
                SectionError::CallFailed {
                    section: section_num,
                    heading,
                    kind: e.kind(),
                    detail: e.message,
                },
            ))
        }
    };

    notify(callback, |c| {
        c.on_token_usage(UsageStage::Section(section_num), reply.usage)
    });

    if reply.text.trim().is_empty() {
        return Err(skip(
            callback,
            total,
            SectionError::EmptyResponse {
                section: section_num,
                heading,
            },
        ));
    }

    debug!(
        "Section {}/{} '{}': {} chars of response",
        section_num,
        total,
        heading,
        reply.text.len()
    );
    notify(callback, |c| {
        c.on_section_complete(section_num, total, reply.text.len())
    });

    Ok((
        RawSectionResponse {
            section: section_num,
            heading,
            text: reply.text,
        },
        reply.usage,
    ))
}

fn skip(callback: Option<&ProgressCallback>, total: usize, err: SectionError) -> SectionError {
    warn!("{}", err);
    let reason = err.to_string();
    notify(callback, |c| c.on_section_skipped(err.section(), total, &reason));
    err
}

//! End-to-end entry points: document in, study notes out.
//!
//! [`generate_notes`] runs every stage and returns only when the whole
//! document is done. The split entry points ([`extract_sections`],
//! [`notes_from_sections`]) let callers inspect or edit the extracted sections
//! before paying for note generation. Use [`crate::stream::generate_stream`]
//! for per-section results as they complete.

use crate::config::NotesConfig;
use crate::error::NotesError;
use crate::output::{DocumentSection, NotesOutput, NotesStats, TokenUsage};
use crate::pipeline::extract;
use crate::pipeline::generate;
use crate::pipeline::input::{self, DocumentFormat, LoadedDocument};
use crate::pipeline::llm::{LanguageModel, ProviderModel};
use crate::pipeline::{render, repair};
use crate::progress::notify;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Result of a full notes run: the notes, or the fatal error that stopped it.
pub type ProcessingOutcome = Result<NotesOutput, NotesError>;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// Turn a PDF/DOCX file or URL into study notes.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(NotesOutput)` on success, even if some sections were lost
/// (check [`NotesOutput::is_degraded`]).
///
/// # Errors
/// Returns `Err(NotesError)` only for fatal errors:
/// - File not found, too large, or not a PDF/DOCX
/// - Extraction failed or returned no sections
/// - Authentication failure during generation
/// - No section produced a response, or none could be repaired
pub async fn generate_notes(input_str: impl AsRef<str>, config: &NotesConfig) -> ProcessingOutcome {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting notes run: {}", input_str);

    // ── Step 1: Resolve and load input ───────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let document = input::load_document(resolved.path(), config.max_file_size_mb).await?;

    // ── Step 2: Get model ────────────────────────────────────────────────
    let model = resolve_model(config)?;

    run(model.as_ref(), &document, config, total_start).await
}

/// Turn document bytes already in memory into study notes.
///
/// The bytes are checked against the configured size limit like a file
/// would be; `format` is trusted as given.
pub async fn generate_notes_from_bytes(
    bytes: &[u8],
    format: DocumentFormat,
    config: &NotesConfig,
) -> ProcessingOutcome {
    let total_start = Instant::now();
    let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
    if size_mb > config.max_file_size_mb as f64 {
        return Err(NotesError::FileTooLarge {
            path: "<memory>".into(),
            size_mb,
            limit_mb: config.max_file_size_mb,
        });
    }

    let document = LoadedDocument {
        bytes: bytes.to_vec(),
        format,
        name: format!("<{} bytes>", bytes.len()),
    };
    let model = resolve_model(config)?;
    run(model.as_ref(), &document, config, total_start).await
}

/// Run the full pipeline and write the rendered notes to `output_path`.
///
/// The format comes from `config.output_format`. Uses atomic write (temp file
/// + rename) so a failed run never leaves a partial file behind.
pub async fn generate_notes_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &NotesConfig,
) -> Result<NotesStats, NotesError> {
    let output = generate_notes(input_str, config).await?;
    let bytes = render::render(&output.document, config.output_format)?;
    write_atomic(output_path.as_ref(), &bytes).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`generate_notes`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_notes_sync(input_str: impl AsRef<str>, config: &NotesConfig) -> ProcessingOutcome {
    tokio::runtime::Runtime::new()
        .map_err(|e| NotesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_notes(input_str, config))
}

/// Resolve and load the input, then split it into sections.
///
/// Makes exactly one model call and no note-generation calls.
pub async fn extract_sections(
    input_str: impl AsRef<str>,
    config: &NotesConfig,
) -> Result<Vec<DocumentSection>, NotesError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
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
    Ok(extraction.sections)
}

/// Generate, repair and render notes for sections the caller already has.
pub async fn notes_from_sections(
    sections: &[DocumentSection],
    config: &NotesConfig,
) -> ProcessingOutcome {
    let total_start = Instant::now();
    let model = resolve_model(config)?;
    build_notes(model.as_ref(), sections, TokenUsage::default(), 0, config, total_start).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run(
    model: &dyn LanguageModel,
    document: &LoadedDocument,
    config: &NotesConfig,
    total_start: Instant,
) -> ProcessingOutcome {
    // ── Step 3: Extract sections ─────────────────────────────────────────
    notify(config.progress_callback.as_ref(), |c| {
        c.on_extraction_start(&document.name)
    });
    let extraction_start = Instant::now();
    let extraction = extract::extract(
        model,
        &document.bytes,
        document.format.mime_type(),
        config,
    )
    .await?;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    build_notes(
        model,
        &extraction.sections,
        extraction.usage,
        extraction_duration_ms,
        config,
        total_start,
    )
    .await
}

async fn build_notes(
    model: &dyn LanguageModel,
    sections: &[DocumentSection],
    extraction_usage: TokenUsage,
    extraction_duration_ms: u64,
    config: &NotesConfig,
    total_start: Instant,
) -> ProcessingOutcome {
    // ── Step 4: One call per section ─────────────────────────────────────
    let generation_start = Instant::now();
    let generation = generate::generate(model, sections, config).await?;
    let generation_duration_ms = generation_start.elapsed().as_millis() as u64;

    // ── Step 5: Repair and merge ─────────────────────────────────────────
    let merged = repair::repair_and_merge(&generation.responses)?;

    // ── Step 6: Render and compute stats ─────────────────────────────────
    let markdown = render::render_markdown(&merged.document);

    let mut usage = extraction_usage;
    usage += generation.usage;
    let stats = collect_stats(
        sections.len(),
        &generation,
        &merged,
        usage,
        extraction_duration_ms,
        generation_duration_ms,
        total_start.elapsed().as_millis() as u64,
    );

    info!(
        "Notes complete: {} records from {}/{} sections, {}ms total",
        stats.record_count,
        stats.processed_sections - stats.unrecovered_sections,
        stats.total_sections,
        stats.total_duration_ms
    );
    notify(config.progress_callback.as_ref(), |c| {
        c.on_notes_complete(
            stats.record_count,
            stats.processed_sections - stats.unrecovered_sections,
            stats.total_sections,
        )
    });

    Ok(NotesOutput {
        document: merged.document,
        markdown,
        skipped: generation.skipped,
        unrecovered: merged.unrecovered,
        stats,
    })
}

fn collect_stats(
    total_sections: usize,
    generation: &generate::Generation,
    merged: &repair::MergeOutcome,
    usage: TokenUsage,
    extraction_duration_ms: u64,
    generation_duration_ms: u64,
    total_duration_ms: u64,
) -> NotesStats {
    NotesStats {
        total_sections,
        processed_sections: generation.responses.len(),
        skipped_sections: generation.skipped.len(),
        unrecovered_sections: merged.unrecovered.len(),
        repaired_sections: merged.repaired_sections,
        record_count: merged.document.len(),
        dropped_records: merged.dropped_records,
        total_input_tokens: usage.input_tokens as u64,
        total_output_tokens: usage.output_tokens as u64,
        extraction_duration_ms,
        generation_duration_ms,
        total_duration_ms,
    }
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so the
/// destination is either left untouched or fully written.
///
/// Missing parent directories are created. The temp file is removed when the
/// rename fails.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), NotesError> {
    let write_err = |e| NotesError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(write_err(e));
    }
    Ok(())
}

/// Resolve the model every stage talks to.
///
/// An explicit [`NotesConfig::language_model`] is used as-is; otherwise an
/// edgequake-llm provider is resolved and wrapped in a [`ProviderModel`],
/// which adds the timeout and retry policy from the config.
pub fn resolve_model(config: &NotesConfig) -> Result<Arc<dyn LanguageModel>, NotesError> {
    if let Some(ref model) = config.language_model {
        return Ok(Arc::clone(model));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(ProviderModel::new(provider, config)))
}

/// Default model for a named provider when the config names none.
fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "gemini" | "google" | "vertexai" => DEFAULT_GEMINI_MODEL,
        _ => DEFAULT_OPENAI_MODEL,
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, NotesError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        NotesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_set(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when
///    both are set.
/// 4. **Gemini** when `GEMINI_API_KEY` or `GOOGLE_API_KEY` is set. Document
///    extraction needs native PDF/DOCX input, which Gemini accepts directly.
/// 5. **OpenAI** when `OPENAI_API_KEY` is set.
/// 6. **Full auto-detection** via `ProviderFactory::from_env`.
fn resolve_provider(config: &NotesConfig) -> Result<Arc<dyn LLMProvider>, NotesError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if env_set("GEMINI_API_KEY") || env_set("GOOGLE_API_KEY") {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider("gemini", model);
    }

    if env_set("OPENAI_API_KEY") {
        let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| NotesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

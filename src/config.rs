//! Configuration types for document-to-notes conversion.
//!
//! All run behaviour is controlled through [`NotesConfig`], built via its
//! [`NotesConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across tasks and to log exactly what a run used.

use crate::error::NotesError;
use crate::pipeline::llm::LanguageModel;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a notes run.
///
/// Built via [`NotesConfig::builder()`] or using [`NotesConfig::default()`].
///
/// # Example
/// ```rust
/// use notescraft::{NoteStyle, NotesConfig};
///
/// let config = NotesConfig::builder()
///     .model("gemini-2.5-flash")
///     .note_style(NoteStyle::Summary)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct NotesConfig {
    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, a per-provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model seam. Takes precedence over everything else;
    /// no retry or timeout wrapping is applied to it.
    pub language_model: Option<Arc<dyn LanguageModel>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Extraction must not paraphrase and note generation should stay close to
    /// the source, so the default is low.
    pub temperature: f32,

    /// Maximum output tokens per call. Default: 8192.
    ///
    /// Extraction returns the whole document's text in one response, so this
    /// is set well above a typical chat completion.
    pub max_tokens: usize,

    /// Retries per call on a transient failure (rate limit, network, timeout). Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Number of section calls in flight at once. Default: 1 (sequential).
    ///
    /// Provider free tiers allow only a handful of requests per minute, so the
    /// default issues one call at a time. Raising it keeps output in section
    /// order regardless of completion order.
    pub concurrency: usize,

    /// Sections whose trimmed body is shorter than this are skipped. Default: 20.
    pub min_section_chars: usize,

    /// Largest accepted input document in megabytes. Default: 50.
    pub max_file_size_mb: u64,

    /// Which built-in note prompt to use. Default: [`NoteStyle::Detailed`].
    pub note_style: NoteStyle,

    /// Custom extraction system instruction. If None, the built-in one is used.
    pub extraction_prompt: Option<String>,

    /// Custom note-generation system instruction. Overrides `note_style`.
    pub notes_prompt: Option<String>,

    /// Rendering used by [`crate::notes::generate_notes_to_file`]. Default: Markdown.
    pub output_format: OutputFormat,

    /// Observer for progress and token-usage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            language_model: None,
            temperature: 0.2,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            download_timeout_secs: 120,
            concurrency: 1,
            min_section_chars: 20,
            max_file_size_mb: 50,
            note_style: NoteStyle::default(),
            extraction_prompt: None,
            notes_prompt: None,
            output_format: OutputFormat::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for NotesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "language_model",
                &self.language_model.as_ref().map(|_| "<dyn LanguageModel>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("min_section_chars", &self.min_section_chars)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("note_style", &self.note_style)
            .field("output_format", &self.output_format)
            .finish()
    }
}

impl NotesConfig {
    /// Create a new builder for `NotesConfig`.
    pub fn builder() -> NotesConfigBuilder {
        NotesConfigBuilder {
            config: Self::default(),
        }
    }

    /// The note-generation system instruction this config resolves to.
    pub fn notes_system_prompt(&self) -> &str {
        self.notes_prompt
            .as_deref()
            .unwrap_or_else(|| self.note_style.system_prompt())
    }

    /// The extraction system instruction this config resolves to.
    pub fn extraction_system_prompt(&self) -> &str {
        self.extraction_prompt
            .as_deref()
            .unwrap_or(crate::prompts::EXTRACTION_PROMPT)
    }
}

/// Builder for [`NotesConfig`].
pub struct NotesConfigBuilder {
    config: NotesConfig,
}

impl fmt::Debug for NotesConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl NotesConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.config.language_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn min_section_chars(mut self, n: usize) -> Self {
        self.config.min_section_chars = n;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn note_style(mut self, style: NoteStyle) -> Self {
        self.config.note_style = style;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn notes_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.notes_prompt = Some(prompt.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NotesConfig, NotesError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(NotesError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(NotesError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(NotesError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.max_file_size_mb == 0 {
            return Err(NotesError::InvalidConfig(
                "Maximum file size must be at least 1 MB".into(),
            ));
        }
        if matches!(c.notes_prompt.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(NotesError::InvalidConfig(
                "Custom notes prompt is empty".into(),
            ));
        }
        if matches!(c.extraction_prompt.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(NotesError::InvalidConfig(
                "Custom extraction prompt is empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How thorough the generated notes should be.
///
/// | Style | Use case |
/// |-------|----------|
/// | Detailed | Full study notes: every section rephrased with examples (default) |
/// | Summary | Quick revision: short explanations plus a closing "Key Definitions" list |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStyle {
    #[default]
    Detailed,
    Summary,
}

impl NoteStyle {
    /// The built-in system instruction for this style.
    pub fn system_prompt(self) -> &'static str {
        match self {
            NoteStyle::Detailed => crate::prompts::DETAILED_NOTES_PROMPT,
            NoteStyle::Summary => crate::prompts::SUMMARY_NOTES_PROMPT,
        }
    }
}

/// File format produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Markdown headings, paragraphs and bullets. (default)
    #[default]
    Markdown,
    /// Pretty-printed JSON array of `{kind, text}` records.
    Json,
    /// Word document.
    Docx,
}

impl OutputFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Docx => "docx",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Docx => "docx",
        })
    }
}

//! Model interaction: the [`LanguageModel`] seam and its edgequake-llm adapter.
//!
//! The extraction and generation stages only need "system instruction + text
//! (+ optional document bytes) in, text out, may fail". [`LanguageModel`]
//! captures exactly that, so the stages can be driven by any provider or by a
//! scripted test double.
//!
//! [`ProviderModel`] is the production implementation. It owns the transport
//! concerns the stages deliberately leave out: a per-call timeout and
//! exponential-backoff retries for transient failures
//! (`retry_backoff_ms * 2^attempt`, so 500 ms → 1 s → 2 s).

use crate::config::NotesConfig;
use crate::error::{classify_error, ErrorKind};
use crate::output::TokenUsage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A document attached to a model request.
#[derive(Clone, Copy)]
pub struct Attachment<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

impl fmt::Debug for Attachment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// One model call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub attachment: Option<Attachment<'a>>,
}

impl<'a> ModelRequest<'a> {
    /// A text-only request.
    pub fn text(system: &'a str, prompt: &'a str) -> Self {
        Self {
            system,
            prompt,
            attachment: None,
        }
    }

    /// A request carrying a whole document and no user text.
    pub fn document(system: &'a str, bytes: &'a [u8], mime_type: &'a str) -> Self {
        Self {
            system,
            prompt: "",
            attachment: Some(Attachment { bytes, mime_type }),
        }
    }
}

/// What a model call returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// A failed model call, carrying the provider's message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ModelError {
    pub message: String,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Classify by inspecting the message text.
    pub fn kind(&self) -> ErrorKind {
        classify_error(&self.message)
    }
}

/// Text-in, text-out model used by the extraction and generation stages.
pub trait LanguageModel: Send + Sync {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> BoxFuture<'a, Result<ModelReply, ModelError>>;
}

/// [`LanguageModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &NotesConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        let start = Instant::now();
        let messages = build_messages(&request);
        let mut last_err: Option<ModelError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let outcome = timeout(self.api_timeout, self.provider.chat(&messages, Some(&self.options))).await;
            let err = match outcome {
                Ok(Ok(response)) => {
                    debug!(
                        "Model call: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ModelReply {
                        text: response.content,
                        usage: TokenUsage {
                            input_tokens: response.prompt_tokens,
                            output_tokens: response.completion_tokens,
                        },
                    });
                }
                Ok(Err(e)) => ModelError::new(e.to_string()),
                Err(_) => ModelError::new(format!(
                    "request timed out after {}s",
                    self.api_timeout.as_secs()
                )),
            };

            warn!("Model call: attempt {} failed — {}", attempt + 1, err);
            if !is_retryable(err.kind()) {
                return Err(err);
            }
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| ModelError::new("Unknown error")))
    }
}

impl LanguageModel for ProviderModel {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> BoxFuture<'a, Result<ModelReply, ModelError>> {
        Box::pin(self.call(request))
    }
}

/// Retrying helps only when the provider is momentarily unable to answer.
fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::RateLimited | ErrorKind::NetworkUnavailable | ErrorKind::Timeout
    )
}

/// Build the chat transcript for a request.
///
/// Documents travel as an inline attachment on the user turn; the user text
/// is empty because the document carries all the content.
fn build_messages(request: &ModelRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(request.system)];
    match request.attachment {
        Some(doc) => {
            let data = ImageData::new(STANDARD.encode(doc.bytes), doc.mime_type);
            messages.push(ChatMessage::user_with_images(request.prompt, vec![data]));
        }
        None => messages.push(ChatMessage::user(request.prompt)),
    }
    messages
}

/// Build `CompletionOptions` from the notes config.
fn build_options(config: &NotesConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

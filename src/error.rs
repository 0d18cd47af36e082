//! Error types for the notescraft library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`NotesError`] — **Fatal**: the document cannot be turned into notes at
//!   all (unsupported file, broken credentials, nothing recoverable from the
//!   model). Returned as `Err(NotesError)` from the top-level entry points.
//!
//! * [`SectionError`] — **Non-fatal**: a single section was skipped (too
//!   short, transient API error, unrepairable response) but the rest of the
//!   document is fine. Stored inside [`crate::output::NotesOutput`] so callers
//!   can see what a degraded result is missing.
//!
//! Every fatal error maps to an [`ErrorKind`], which carries the
//! plain-language message shown to end users. The `Display` text of the error
//! itself is the technical detail and is meant for logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notescraft library.
#[derive(Debug, Error)]
pub enum NotesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document is larger than the configured upload limit.
    #[error("Document '{path}' is {size_mb:.1} MB; the limit is {limit_mb} MB")]
    FileTooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: u64,
    },

    /// The document is neither a PDF nor a DOCX file.
    #[error("Unsupported document format: {detail}")]
    UnsupportedFormat { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The extraction response was not a JSON object of sections.
    #[error("Extraction response is not a JSON object of sections: {detail}")]
    InvalidResponseFormat { detail: String },

    /// The provider rejected the credentials (401/403).
    #[error("Authentication error during {stage}: {detail}")]
    AuthenticationFailure { stage: Stage, detail: String },

    /// The provider's usage quota is exhausted.
    #[error("Quota exceeded during {stage}: {detail}")]
    QuotaExceeded { stage: Stage, detail: String },

    /// The provider returned HTTP 429.
    #[error("Rate limited during {stage}: {detail}")]
    RateLimited { stage: Stage, detail: String },

    /// The provider could not be reached.
    #[error("Network unavailable during {stage}: {detail}")]
    NetworkUnavailable { stage: Stage, detail: String },

    /// The model call exceeded its timeout.
    #[error("Model call timed out during {stage}: {detail}")]
    ApiTimeout { stage: Stage, detail: String },

    /// Any other provider failure that matched no known pattern.
    #[error("Model call failed during {stage}: {detail}")]
    ProviderFailure { stage: Stage, detail: String },

    // ── Pipeline outcome errors ───────────────────────────────────────────
    /// Extraction or generation produced nothing usable.
    #[error("No content produced: {detail}")]
    NoContentProduced { detail: String },

    /// Every section response failed both strict parsing and tolerant repair.
    #[error("All {sections} section responses were unrecoverable; no notes could be built")]
    AllSectionsUnrecoverable { sections: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rendering backend failed to produce the document.
    #[error("Failed to render notes as {format}: {detail}")]
    RenderFailed { format: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which pipeline stage a model failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => f.write_str("extraction"),
            Stage::Generation => f.write_str("generation"),
        }
    }
}

/// The error taxonomy shared by fatal and per-section failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    InvalidResponseFormat,
    AuthenticationFailure,
    QuotaExceeded,
    RateLimited,
    NetworkUnavailable,
    Timeout,
    ProviderFailure,
    NoContentProduced,
    AllSectionsUnrecoverable,
    Configuration,
    Output,
    Internal,
}

impl ErrorKind {
    /// Plain-language message for end users. Never contains technical detail.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => {
                "We couldn't read your file. Please check it and upload it again."
            }
            ErrorKind::UnsupportedFormat => {
                "This file type is not supported. Please upload a PDF or DOCX file."
            }
            ErrorKind::InvalidResponseFormat => {
                "We couldn't understand the structure of your document. Please try again."
            }
            ErrorKind::AuthenticationFailure => {
                "We're experiencing an issue with our AI service. Please try again in a few minutes."
            }
            ErrorKind::QuotaExceeded => {
                "We've reached our processing limit. Service will resume later."
            }
            ErrorKind::RateLimited => {
                "Our service is currently busy. Please wait a moment and try again."
            }
            ErrorKind::NetworkUnavailable => {
                "We're having trouble connecting to our AI service. Please try again."
            }
            ErrorKind::Timeout => {
                "The processing is taking longer than expected. Please try again."
            }
            ErrorKind::ProviderFailure => {
                "We encountered an issue while generating your notes. Please try again."
            }
            ErrorKind::NoContentProduced => {
                "The document content appears incomplete. Please check your file and try again."
            }
            ErrorKind::AllSectionsUnrecoverable => {
                "We encountered a processing error while building your notes. Please try again."
            }
            ErrorKind::Configuration => {
                "The notes service is not configured correctly. Please contact support."
            }
            ErrorKind::Output => "There was an issue creating your notes file. Please try again.",
            ErrorKind::Internal => {
                "Something went wrong. Please try again or contact support if the issue persists."
            }
        }
    }

    /// Whether retrying the whole document later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkUnavailable
                | ErrorKind::Timeout
                | ErrorKind::ProviderFailure
                | ErrorKind::AllSectionsUnrecoverable
                | ErrorKind::Output
        )
    }

    /// Whether a generation call failing with this kind only costs its section.
    ///
    /// Authentication failures halt the document; everything else skips the
    /// section and carries on.
    pub fn is_section_recoverable(self) -> bool {
        !matches!(self, ErrorKind::AuthenticationFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::InvalidResponseFormat => "invalid_response_format",
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProviderFailure => "provider_failure",
            ErrorKind::NoContentProduced => "no_content_produced",
            ErrorKind::AllSectionsUnrecoverable => "all_sections_unrecoverable",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Output => "output",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "authentication",
    "unauthorized",
    "unauthenticated",
    "401",
    "permission",
    "forbidden",
    "403",
];
const RATE_MARKERS: &[&str] = &["rate limit", "rate_limit", "429", "too many requests"];
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "limit exceeded",
    "resource_exhausted",
    "resource exhausted",
];
const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded", "504"];
const NETWORK_MARKERS: &[&str] = &[
    "connection",
    "network",
    "dns",
    "unavailable",
    "502",
    "503",
];

/// Classify a provider error message into an [`ErrorKind`].
///
/// Groups are checked in order, so "429 quota exceeded" is a rate limit and
/// "401 timeout" is an authentication failure.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(AUTH_MARKERS) {
        ErrorKind::AuthenticationFailure
    } else if has(RATE_MARKERS) {
        ErrorKind::RateLimited
    } else if has(QUOTA_MARKERS) {
        ErrorKind::QuotaExceeded
    } else if has(TIMEOUT_MARKERS) {
        ErrorKind::Timeout
    } else if has(NETWORK_MARKERS) {
        ErrorKind::NetworkUnavailable
    } else {
        ErrorKind::ProviderFailure
    }
}

impl NotesError {
    /// Build the stage-tagged error for a classified model failure.
    pub fn from_model_failure(stage: Stage, kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::AuthenticationFailure => NotesError::AuthenticationFailure { stage, detail },
            ErrorKind::QuotaExceeded => NotesError::QuotaExceeded { stage, detail },
            ErrorKind::RateLimited => NotesError::RateLimited { stage, detail },
            ErrorKind::NetworkUnavailable => NotesError::NetworkUnavailable { stage, detail },
            ErrorKind::Timeout => NotesError::ApiTimeout { stage, detail },
            _ => NotesError::ProviderFailure { stage, detail },
        }
    }

    /// The taxonomy entry for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotesError::FileNotFound { .. }
            | NotesError::PermissionDenied { .. }
            | NotesError::InvalidInput { .. }
            | NotesError::DownloadFailed { .. }
            | NotesError::DownloadTimeout { .. }
            | NotesError::FileTooLarge { .. } => ErrorKind::InvalidInput,
            NotesError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            NotesError::ProviderNotConfigured { .. } | NotesError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            NotesError::InvalidResponseFormat { .. } => ErrorKind::InvalidResponseFormat,
            NotesError::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            NotesError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            NotesError::RateLimited { .. } => ErrorKind::RateLimited,
            NotesError::NetworkUnavailable { .. } => ErrorKind::NetworkUnavailable,
            NotesError::ApiTimeout { .. } => ErrorKind::Timeout,
            NotesError::ProviderFailure { .. } => ErrorKind::ProviderFailure,
            NotesError::NoContentProduced { .. } => ErrorKind::NoContentProduced,
            NotesError::AllSectionsUnrecoverable { .. } => ErrorKind::AllSectionsUnrecoverable,
            NotesError::OutputWriteFailed { .. } | NotesError::RenderFailed { .. } => {
                ErrorKind::Output
            }
            NotesError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Plain-language message for end users.
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    /// Structured descriptor for callers that present or persist failures.
    pub fn report(&self) -> ErrorReport {
        let kind = self.kind();
        ErrorReport {
            kind,
            technical: self.to_string(),
            user_message: kind.user_message().to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

/// Serialisable form of a fatal error: kind, technical detail, user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub technical: String,
    pub user_message: String,
    pub retryable: bool,
}

/// A non-fatal error for a single section.
///
/// Section numbers are 1-indexed in document order.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SectionError {
    /// The body was empty or shorter than the configured threshold.
    #[error("Section {section} '{heading}': body has {chars} chars, below the {min} char minimum")]
    BelowThreshold {
        section: usize,
        heading: String,
        chars: usize,
        min: usize,
    },

    /// The generation call failed with a section-recoverable error.
    #[error("Section {section} '{heading}': {kind} — {detail}")]
    CallFailed {
        section: usize,
        heading: String,
        kind: ErrorKind,
        detail: String,
    },

    /// The call succeeded but returned no text.
    #[error("Section {section} '{heading}': model returned no text")]
    EmptyResponse { section: usize, heading: String },

    /// Neither strict parsing nor tolerant repair yielded a record.
    #[error("Section {section} '{heading}': response could not be repaired into note records")]
    Unrecoverable { section: usize, heading: String },
}

impl SectionError {
    /// 1-indexed section number.
    pub fn section(&self) -> usize {
        match self {
            SectionError::BelowThreshold { section, .. }
            | SectionError::CallFailed { section, .. }
            | SectionError::EmptyResponse { section, .. }
            | SectionError::Unrecoverable { section, .. } => *section,
        }
    }

    pub fn heading(&self) -> &str {
        match self {
            SectionError::BelowThreshold { heading, .. }
            | SectionError::CallFailed { heading, .. }
            | SectionError::EmptyResponse { heading, .. }
            | SectionError::Unrecoverable { heading, .. } => heading,
        }
    }

    /// True when this failure must stop the whole document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SectionError::CallFailed { kind, .. } if !kind.is_section_recoverable())
    }

    /// Promote a fatal section failure to the document-level error.
    pub fn into_fatal(self) -> NotesError {
        match self {
            SectionError::CallFailed { kind, detail, .. } => {
                NotesError::from_model_failure(Stage::Generation, kind, detail)
            }
            other => NotesError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_authentication() {
        assert_eq!(
            classify_error("API key not valid. Please pass a valid API key."),
            ErrorKind::AuthenticationFailure
        );
        assert_eq!(
            classify_error("HTTP 403 Forbidden"),
            ErrorKind::AuthenticationFailure
        );
    }

    #[test]
    fn classify_rate_limit_before_quota() {
        assert_eq!(
            classify_error("429 RESOURCE_EXHAUSTED: quota exceeded"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error("Daily quota exhausted"),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn classify_timeout_and_network() {
        assert_eq!(classify_error("request timed out"), ErrorKind::Timeout);
        assert_eq!(
            classify_error("error trying to connect: dns error"),
            ErrorKind::NetworkUnavailable
        );
        assert_eq!(
            classify_error("503 Service Unavailable"),
            ErrorKind::NetworkUnavailable
        );
    }

    #[test]
    fn classify_unknown_is_provider_failure() {
        assert_eq!(
            classify_error("model produced an invalid tool call"),
            ErrorKind::ProviderFailure
        );
    }

    #[test]
    fn only_authentication_halts_generation() {
        assert!(!ErrorKind::AuthenticationFailure.is_section_recoverable());
        assert!(ErrorKind::RateLimited.is_section_recoverable());
        assert!(ErrorKind::QuotaExceeded.is_section_recoverable());
        assert!(ErrorKind::Timeout.is_section_recoverable());
    }

    #[test]
    fn model_failure_maps_to_stage_tagged_variant() {
        let e = NotesError::from_model_failure(Stage::Generation, ErrorKind::Timeout, "60s");
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert!(e.to_string().contains("generation"), "got: {e}");
    }

    #[test]
    fn report_separates_user_message_from_detail() {
        let e = NotesError::AuthenticationFailure {
            stage: Stage::Extraction,
            detail: "401 invalid key sk-abc".into(),
        };
        let report = e.report();
        assert_eq!(report.kind, ErrorKind::AuthenticationFailure);
        assert!(report.technical.contains("sk-abc"));
        assert!(!report.user_message.contains("sk-abc"));
        assert!(!report.retryable);
    }

    #[test]
    fn all_sections_unrecoverable_display() {
        let e = NotesError::AllSectionsUnrecoverable { sections: 4 };
        assert!(e.to_string().contains("All 4"), "got: {e}");
        assert_eq!(e.kind(), ErrorKind::AllSectionsUnrecoverable);
    }

    #[test]
    fn section_error_accessors() {
        let e = SectionError::CallFailed {
            section: 2,
            heading: "Markets".into(),
            kind: ErrorKind::RateLimited,
            detail: "429".into(),
        };
        assert_eq!(e.section(), 2);
        assert_eq!(e.heading(), "Markets");
        assert!(e.to_string().contains("rate_limited"));
        assert!(!e.is_fatal());
    }

    #[test]
    fn auth_section_failure_is_fatal() {
        let e = SectionError::CallFailed {
            section: 1,
            heading: "Intro".into(),
            kind: ErrorKind::AuthenticationFailure,
            detail: "401".into(),
        };
        assert!(e.is_fatal());
        let fatal = e.into_fatal();
        assert!(matches!(
            fatal,
            NotesError::AuthenticationFailure {
                stage: Stage::Generation,
                ..
            }
        ));
    }
}

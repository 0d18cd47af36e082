//! Progress and token-metering callbacks.
//!
//! Inject an [`Arc<dyn NotesProgressCallback>`] via
//! [`crate::config::NotesConfigBuilder::progress_callback`] to receive events
//! as the pipeline extracts sections and generates notes for each of them.
//!
//! Observers are purely informational. Every invocation goes through
//! [`notify`], which catches a panicking observer and logs it, so a broken
//! progress bar or metering sink can never fail a notes run.
//!
//! # Example
//!
//! ```rust
//! use notescraft::{NotesConfig, NotesProgressCallback, TokenUsage, UsageStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct TokenCounter {
//!     total: AtomicUsize,
//! }
//!
//! impl NotesProgressCallback for TokenCounter {
//!     fn on_token_usage(&self, _stage: UsageStage, usage: TokenUsage) {
//!         self.total.fetch_add(usage.total(), Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(TokenCounter { total: AtomicUsize::new(0) });
//! let config = NotesConfig::builder()
//!     .progress_callback(counter as Arc<dyn NotesProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::TokenUsage;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Which kind of model call a usage report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStage {
    /// The single document-level extraction call.
    Extraction,
    /// One section's note-generation call (1-indexed section number).
    Section(usize),
}

/// Called by the pipeline as it works through a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1`, section events may arrive
/// from several tasks at once; protect shared state accordingly.
pub trait NotesProgressCallback: Send + Sync {
    /// Called before the extraction call is sent.
    fn on_extraction_start(&self, source: &str) {
        let _ = source;
    }

    /// Called once the document has been split into sections.
    fn on_extraction_complete(&self, section_count: usize) {
        let _ = section_count;
    }

    /// Called just before a section's generation call is sent.
    fn on_section_start(&self, section: usize, total: usize, heading: &str) {
        let _ = (section, total, heading);
    }

    /// Called when a section's call returned text.
    fn on_section_complete(&self, section: usize, total: usize, response_len: usize) {
        let _ = (section, total, response_len);
    }

    /// Called when a section was skipped, with the reason.
    fn on_section_skipped(&self, section: usize, total: usize, reason: &str) {
        let _ = (section, total, reason);
    }

    /// Called after every successful model call with its token counts.
    fn on_token_usage(&self, stage: UsageStage, usage: TokenUsage) {
        let _ = (stage, usage);
    }

    /// Called once the notes document has been assembled.
    fn on_notes_complete(&self, record_count: usize, sections_used: usize, total_sections: usize) {
        let _ = (record_count, sections_used, total_sections);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopProgressCallback;

impl NotesProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::NotesConfig`].
pub type ProgressCallback = Arc<dyn NotesProgressCallback>;

/// Invoke `event` on the observer, if any, inside a panic boundary.
pub fn notify<F>(callback: Option<&ProgressCallback>, event: F)
where
    F: FnOnce(&dyn NotesProgressCallback),
{
    let Some(cb) = callback else {
        return;
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| event(cb.as_ref())));
    if result.is_err() {
        warn!("Progress callback panicked; event ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        tokens: AtomicUsize,
    }

    impl NotesProgressCallback for TrackingCallback {
        fn on_section_start(&self, _section: usize, _total: usize, _heading: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_complete(&self, _section: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_skipped(&self, _section: usize, _total: usize, _reason: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_token_usage(&self, _stage: UsageStage, usage: TokenUsage) {
            self.tokens.fetch_add(usage.total(), Ordering::SeqCst);
        }
    }

    struct PanickingCallback;

    impl NotesProgressCallback for PanickingCallback {
        fn on_token_usage(&self, _stage: UsageStage, _usage: TokenUsage) {
            panic!("metering sink is down");
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        notify(Some(&cb), |c| c.on_extraction_start("doc.pdf"));
        notify(Some(&cb), |c| c.on_section_skipped(1, 3, "too short"));
        notify(Some(&cb), |c| c.on_notes_complete(10, 2, 3));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            skips: AtomicUsize::new(0),
            tokens: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = tracker.clone();

        notify(Some(&cb), |c| c.on_section_start(1, 2, "Intro"));
        notify(Some(&cb), |c| c.on_section_complete(1, 2, 120));
        notify(Some(&cb), |c| {
            c.on_token_usage(
                UsageStage::Section(1),
                TokenUsage {
                    input_tokens: 30,
                    output_tokens: 12,
                },
            )
        });
        notify(Some(&cb), |c| c.on_section_skipped(2, 2, "rate limited"));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.tokens.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn panicking_observer_is_contained() {
        let cb: ProgressCallback = Arc::new(PanickingCallback);
        notify(Some(&cb), |c| {
            c.on_token_usage(UsageStage::Extraction, TokenUsage::default())
        });
    }

    #[test]
    fn missing_observer_is_a_no_op() {
        notify(None, |c| c.on_extraction_complete(4));
    }
}

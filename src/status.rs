//! Status reporting for the surrounding UI.
//!
//! A [`StatusReporter`] keeps three independent pieces of state:
//!
//! * an **ephemeral status line** — overwritten on every call, meant for
//!   in-flight progress ("OCR processing page 2/5...") and stage errors;
//! * a **persistent result line** — the end-of-pipeline outcome, which stays
//!   visible until the next reset;
//! * a **loading indicator** with its own message, toggled independently.
//!
//! Hosts read the current state with [`StatusReporter::snapshot`] or push it
//! somewhere else by injecting a [`StatusObserver`]. Every update is also
//! traced, which is the only place status is recorded.
//!
//! # Example
//!
//! ```rust
//! use edgequake_bill_intake::{StatusLevel, StatusObserver, StatusMessage, StatusReporter};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl StatusObserver for Printer {
//!     fn on_status(&self, msg: &StatusMessage) {
//!         eprintln!("[{:?}] {}", msg.level, msg.text);
//!     }
//! }
//!
//! let reporter = StatusReporter::new(Some(Arc::new(Printer)));
//! reporter.show_status(StatusLevel::Info, "Reading PDF file...");
//! assert_eq!(reporter.snapshot().status.unwrap().text, "Reading PDF file...");
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// One line on a status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Point-in-time copy of every channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Ephemeral progress/error line.
    pub status: Option<StatusMessage>,
    /// Persistent end-of-pipeline line.
    pub result: Option<StatusMessage>,
    /// `Some(message)` while the loading indicator is shown.
    pub loading: Option<String>,
}

/// Receives every status change.
///
/// All methods have default no-op implementations so hosts only override
/// what they display.
pub trait StatusObserver: Send + Sync {
    /// The ephemeral status line was replaced.
    fn on_status(&self, message: &StatusMessage) {
        let _ = message;
    }

    /// The persistent result line was replaced.
    fn on_result(&self, message: &StatusMessage) {
        let _ = message;
    }

    /// The loading indicator was toggled.
    fn on_loading(&self, loading: bool, message: &str) {
        let _ = (loading, message);
    }

    /// OCR is about to process a page.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages in the document
    fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Every channel was cleared.
    fn on_reset(&self) {}
}

/// A no-op observer for hosts that only poll [`StatusReporter::snapshot`].
pub struct NoopStatusObserver;

impl StatusObserver for NoopStatusObserver {}

/// Convenience alias matching the type stored in [`crate::config::IntakeConfig`].
pub type StatusCallback = Arc<dyn StatusObserver>;

/// Tracks pipeline progress and errors for the surrounding UI.
pub struct StatusReporter {
    state: Mutex<StatusSnapshot>,
    observer: Option<StatusCallback>,
}

impl StatusReporter {
    pub fn new(observer: Option<StatusCallback>) -> Self {
        Self {
            state: Mutex::new(StatusSnapshot::default()),
            observer,
        }
    }

    fn state(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite the ephemeral status line.
    pub fn show_status(&self, level: StatusLevel, text: impl Into<String>) {
        let message = StatusMessage::new(level, text);
        trace_message("status", &message);
        self.state().status = Some(message.clone());
        if let Some(ref obs) = self.observer {
            obs.on_status(&message);
        }
    }

    /// Overwrite the persistent result line.
    pub fn show_result(&self, level: StatusLevel, text: impl Into<String>) {
        let message = StatusMessage::new(level, text);
        trace_message("result", &message);
        self.state().result = Some(message.clone());
        if let Some(ref obs) = self.observer {
            obs.on_result(&message);
        }
    }

    /// Show or hide the loading indicator.
    pub fn set_loading(&self, loading: bool, text: impl Into<String>) {
        let text = text.into();
        self.state().loading = loading.then(|| text.clone());
        if let Some(ref obs) = self.observer {
            obs.on_loading(loading, &text);
        }
    }

    /// Report OCR progress: updates the status line and notifies the observer.
    pub fn ocr_page(&self, page_num: usize, total_pages: usize) {
        self.show_status(
            StatusLevel::Info,
            format!("OCR processing page {page_num}/{total_pages}..."),
        );
        if let Some(ref obs) = self.observer {
            obs.on_ocr_page(page_num, total_pages);
        }
    }

    /// Clear every channel.
    pub fn clear(&self) {
        *self.state() = StatusSnapshot::default();
        if let Some(ref obs) = self.observer {
            obs.on_reset();
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state().clone()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(None)
    }
}

fn trace_message(channel: &str, message: &StatusMessage) {
    match message.level {
        StatusLevel::Error => error!(channel, "{}", message.text),
        _ => info!(channel, "{}", message.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        statuses: AtomicUsize,
        results: AtomicUsize,
        ocr_pages: AtomicUsize,
        resets: AtomicUsize,
    }

    impl StatusObserver for CountingObserver {
        fn on_status(&self, _message: &StatusMessage) {
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_result(&self, _message: &StatusMessage) {
            self.results.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ocr_page(&self, _page_num: usize, _total_pages: usize) {
            self.ocr_pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn status_line_is_overwritten() {
        let r = StatusReporter::default();
        r.show_status(StatusLevel::Info, "first");
        r.show_status(StatusLevel::Error, "second");
        let snap = r.snapshot();
        assert_eq!(
            snap.status,
            Some(StatusMessage::new(StatusLevel::Error, "second"))
        );
        assert!(snap.result.is_none());
    }

    #[test]
    fn channels_are_independent() {
        let r = StatusReporter::default();
        r.show_result(StatusLevel::Success, "saved");
        r.show_status(StatusLevel::Info, "working");
        r.set_loading(true, "Uploading...");

        let snap = r.snapshot();
        assert_eq!(snap.result.unwrap().text, "saved");
        assert_eq!(snap.status.unwrap().text, "working");
        assert_eq!(snap.loading.as_deref(), Some("Uploading..."));

        r.set_loading(false, "");
        assert!(r.snapshot().loading.is_none());
        assert_eq!(r.snapshot().result.unwrap().text, "saved");
    }

    #[test]
    fn ocr_progress_reaches_status_and_observer() {
        let obs = Arc::new(CountingObserver::default());
        let r = StatusReporter::new(Some(obs.clone() as StatusCallback));
        r.ocr_page(1, 2);
        r.ocr_page(2, 2);

        assert_eq!(obs.ocr_pages.load(Ordering::SeqCst), 2);
        assert_eq!(obs.statuses.load(Ordering::SeqCst), 2);
        assert_eq!(
            r.snapshot().status.unwrap().text,
            "OCR processing page 2/2..."
        );
    }

    #[test]
    fn clear_resets_everything() {
        let obs = Arc::new(CountingObserver::default());
        let r = StatusReporter::new(Some(obs.clone() as StatusCallback));
        r.show_result(StatusLevel::Error, "Save failed: x");
        r.set_loading(true, "busy");
        r.clear();
        assert_eq!(r.snapshot(), StatusSnapshot::default());
        assert_eq!(obs.results.load(Ordering::SeqCst), 1);
        assert_eq!(obs.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let cb: StatusCallback = Arc::new(NoopStatusObserver);
        cb.on_status(&StatusMessage::new(StatusLevel::Info, "x"));
        cb.on_result(&StatusMessage::new(StatusLevel::Success, "y"));
        cb.on_loading(true, "z");
        cb.on_ocr_page(1, 1);
        cb.on_reset();
    }
}

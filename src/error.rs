//! Error types for the edgequake-bill-intake library.
//!
//! Every pipeline stage returns [`IntakeError`]. None of them is fatal to the
//! process: the orchestrator ([`crate::session::IntakeSession`]) catches each
//! error at the stage boundary, writes a human-readable line to the status
//! channels and leaves the run in a state where the same action can be
//! retried.
//!
//! Variants are grouped by the stage that raises them:
//!
//! * input — [`IntakeError::FileRead`], [`IntakeError::NotAPdf`]
//! * extraction — [`IntakeError::Extraction`], [`IntakeError::Ocr`],
//!   [`IntakeError::PdfiumBindingFailed`]
//! * remote backend — [`IntakeError::Network`], [`IntakeError::Remote`],
//!   [`IntakeError::MalformedResponse`]
//! * orchestration — [`IntakeError::Validation`],
//!   [`IntakeError::ReviewInProgress`], [`IntakeError::ReviewAbandoned`],
//!   [`IntakeError::StaleRun`], [`IntakeError::NoActiveRun`]

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-bill-intake library.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The selected file could not be read.
    #[error("Cannot read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes were read, but they are not a PDF.
    #[error("'{file_name}' is not a PDF document\nFirst bytes: {magic:?}")]
    NotAPdf { file_name: String, magic: Vec<u8> },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The document could not be parsed at all.
    #[error("Cannot parse '{file_name}': {detail}")]
    Extraction { file_name: String, detail: String },

    /// The OCR engine failed to start or crashed on a page.
    #[error("OCR failed{}: {detail}", page.map(|p| format!(" on page {p}")).unwrap_or_default())]
    Ocr { page: Option<usize>, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory holding libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Remote backend errors ─────────────────────────────────────────────
    /// The request to the backend could not complete.
    #[error("Network error during '{action}': {detail}")]
    Network { action: String, detail: String },

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Remote { action: String, message: String },

    /// The backend answered with a body that is not the expected envelope.
    #[error("Malformed response to '{action}': {detail}")]
    MalformedResponse { action: String, detail: String },

    // ── Orchestration errors ──────────────────────────────────────────────
    /// Required input is missing or an edit was rejected.
    #[error("{0}")]
    Validation(String),

    /// A verification session is already open; it was brought to focus.
    #[error("A verification session is already open (session {session_id})")]
    ReviewInProgress { session_id: u64 },

    /// The review surface was closed without confirming.
    #[error("Verification was dismissed without confirming")]
    ReviewAbandoned,

    /// A result arrived for a run that has since been replaced or reset.
    #[error("Discarded result of superseded run {stale} (current run is {current})")]
    StaleRun { stale: u64, current: u64 },

    /// The operation needs a stage that has not completed for the current run.
    #[error("Nothing to {action}: {hint}")]
    NoActiveRun { action: &'static str, hint: &'static str },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    /// Whether a [`crate::config::RetryPolicy`] may try the failed call again.
    ///
    /// Only transport and OCR engine failures qualify; a backend that answered
    /// with a non-success status will answer the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IntakeError::Network { .. } | IntakeError::Ocr { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_displays_backend_message_verbatim() {
        let e = IntakeError::Remote {
            action: "analyze".into(),
            message: "Quota exceeded".into(),
        };
        assert_eq!(e.to_string(), "Quota exceeded");
    }

    #[test]
    fn ocr_error_mentions_page_when_known() {
        let e = IntakeError::Ocr {
            page: Some(3),
            detail: "engine crashed".into(),
        };
        assert!(e.to_string().contains("page 3"), "got: {e}");

        let e = IntakeError::Ocr {
            page: None,
            detail: "tesseract not found".into(),
        };
        assert!(!e.to_string().contains("page"), "got: {e}");
    }

    #[test]
    fn only_transport_and_ocr_failures_are_retryable() {
        assert!(IntakeError::Network {
            action: "save".into(),
            detail: "connection reset".into()
        }
        .is_retryable());
        assert!(IntakeError::Ocr {
            page: Some(1),
            detail: "x".into()
        }
        .is_retryable());
        assert!(!IntakeError::Remote {
            action: "save".into(),
            message: "sheet locked".into()
        }
        .is_retryable());
        assert!(!IntakeError::Validation("missing".into()).is_retryable());
    }

    #[test]
    fn stale_run_display() {
        let e = IntakeError::StaleRun {
            stale: 2,
            current: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains('2') && msg.contains('3'), "got: {msg}");
    }
}

//! # edgequake-bill-intake
//!
//! Turn a scanned or digital bill (PDF) into a reviewed, stored record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract  native text layer via pdfium; whole-document OCR fallback
//!  ├─ 2. Analyse  remote backend proposes field/value pairs
//!  ├─ 3. Draft    bill id + analysed fields + manual fields + Pending statuses
//!  ├─ 4. Verify   a human edits the draft; id and statuses stay read-only
//!  └─ 5. Submit   record + base64 file saved by the backend
//! ```
//!
//! Every stage reports progress to a [`StatusReporter`] and returns
//! [`IntakeError`] on failure. No failure ends the session: the same action
//! can be retried.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_bill_intake::{IntakeConfig, IntakeSession, ManualFields, ReviewRequest, ReviewSurface};
//! use std::sync::Arc;
//!
//! struct AcceptAsIs;
//!
//! impl ReviewSurface for AcceptAsIs {
//!     fn present(&self, request: ReviewRequest) {
//!         request.confirm();
//!     }
//!     fn focus(&self, _session_id: u64) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IntakeConfig::builder()
//!         .endpoint(std::env::var("BILL_INTAKE_ENDPOINT")?)
//!         .build()?;
//!     let session = IntakeSession::new(config, Arc::new(AcceptAsIs))?;
//!
//!     let extraction = session.select_file("invoice.pdf").await?;
//!     println!("{}", extraction.text);
//!
//!     let manual = ManualFields {
//!         bill_given_by: "Priya".into(),
//!         added_by: "Sam".into(),
//!         ..Default::default()
//!     };
//!     session.analyze(&manual).await?;
//!     let result = session.review_and_submit().await?;
//!     println!("saved: {}", result.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bill-intake` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-bill-intake = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! * pdfium shared library (system-wide, or `PDFIUM_LIB_PATH`)
//! * `tesseract` on `PATH` for scanned bills (only when a document has no text layer)

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod session;
pub mod status;
pub mod verify;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendClient, BackendReply, BackendRequest};
pub use config::{IntakeConfig, IntakeConfigBuilder, RetryPolicy};
pub use error::IntakeError;
pub use pipeline::analyze::AnalysisClient;
pub use pipeline::extract::{ExtractionResult, Extractor, TextSource};
pub use pipeline::input::Document;
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::render::{PdfBackend, PdfiumBackend};
pub use pipeline::submit::{SubmissionResult, Submitter};
pub use record::{is_read_only_field, BillId, BillRecord, DraftFields, ManualFields};
pub use session::IntakeSession;
pub use status::{
    NoopStatusObserver, StatusCallback, StatusLevel, StatusMessage, StatusObserver,
    StatusReporter, StatusSnapshot,
};
pub use verify::{FormField, ReviewForm, ReviewRequest, ReviewSurface, VerificationDesk};

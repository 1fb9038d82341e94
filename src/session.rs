//! The intake session: one bill at a time, from file selection to save.
//!
//! [`IntakeSession`] owns the "current run": the selected [`Document`], its
//! extracted text, the backend's header hints, the draft and the finalized
//! record. Each stage reads what it needs from the run, works without holding
//! the lock, and commits its output back.
//!
//! ## Stale runs
//!
//! Selecting another file (or resetting) does not abort work already in
//! flight. Every run carries a generation number instead; a stage that
//! finishes after its run was replaced discards its output and returns
//! [`IntakeError::StaleRun`].
//!
//! ## Status wording
//!
//! | stage     | success                                                     | failure                  |
//! |-----------|-------------------------------------------------------------|--------------------------|
//! | select    | "Text extracted! Please fill manual details and request analysis." | "Could not extract text." / "Error reading PDF." |
//! | analyze   | (draft returned)                                            | result "Error: <msg>"    |
//! | submit    | result "Bill processed successfully."                       | result "Save failed: <msg>" |

use crate::backend::BackendClient;
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::analyze::AnalysisClient;
use crate::pipeline::extract::{ExtractionResult, Extractor};
use crate::pipeline::input::Document;
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::render::{PdfBackend, PdfiumBackend};
use crate::pipeline::submit::{SubmissionResult, Submitter};
use crate::record::{BillId, BillRecord, ManualFields};
use crate::status::{StatusLevel, StatusReporter, StatusSnapshot};
use crate::verify::{ReviewSurface, VerificationDesk};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Everything the session knows about the bill being processed.
#[derive(Default)]
struct RunState {
    generation: u64,
    document: Option<Arc<Document>>,
    extraction: Option<ExtractionResult>,
    /// Text sent to analysis; starts as the extracted text, editable.
    text: String,
    header_hints: Vec<String>,
    draft: Option<BillRecord>,
    finalized: Option<BillRecord>,
    /// Set by a successful save. Nothing more can happen to this document.
    completed: bool,
}

impl RunState {
    /// Drop the run and release its display handle.
    fn discard(&mut self) -> u64 {
        if let Some(doc) = self.document.take() {
            doc.release_handle();
        }
        let generation = self.generation + 1;
        *self = RunState {
            generation,
            ..Default::default()
        };
        generation
    }

    fn check(&self, generation: u64) -> Result<(), IntakeError> {
        if self.generation == generation {
            Ok(())
        } else {
            Err(IntakeError::StaleRun {
                stale: generation,
                current: self.generation,
            })
        }
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), IntakeError> {
        if self.completed {
            return Err(IntakeError::NoActiveRun {
                action,
                hint: "this bill was already saved; select a new file",
            });
        }
        Ok(())
    }
}

/// Orchestrates extraction, analysis, review and submission for one bill.
///
/// # Example
/// ```rust,no_run
/// use edgequake_bill_intake::{IntakeConfig, IntakeSession, ManualFields, ReviewRequest, ReviewSurface};
/// use std::sync::Arc;
///
/// struct AutoConfirm;
///
/// impl ReviewSurface for AutoConfirm {
///     fn present(&self, request: ReviewRequest) {
///         request.confirm();
///     }
///     fn focus(&self, _session_id: u64) {}
/// }
///
/// # async fn run() -> Result<(), edgequake_bill_intake::IntakeError> {
/// let config = IntakeConfig::builder()
///     .endpoint("https://script.example.com/macros/s/abc/exec")
///     .build()?;
/// let session = IntakeSession::new(config, Arc::new(AutoConfirm))?;
///
/// session.select_file("invoice.pdf").await?;
/// session
///     .analyze(&ManualFields {
///         bill_given_by: "Priya".into(),
///         added_by: "Sam".into(),
///         ..Default::default()
///     })
///     .await?;
/// let result = session.review_and_submit().await?;
/// assert!(result.success);
/// # Ok(())
/// # }
/// ```
pub struct IntakeSession {
    config: IntakeConfig,
    extractor: Extractor,
    analysis: AnalysisClient,
    submitter: Submitter,
    desk: VerificationDesk,
    status: Arc<StatusReporter>,
    run: Mutex<RunState>,
}

impl IntakeSession {
    /// Session with the default engines: pdfium for parsing and the
    /// `tesseract` CLI for OCR.
    pub fn new(config: IntakeConfig, surface: Arc<dyn ReviewSurface>) -> Result<Self, IntakeError> {
        let pdf = Arc::new(PdfiumBackend::new(config.pdfium_lib_path.clone()));
        let ocr = Arc::new(TesseractEngine::from_config(&config));
        Self::with_backends(config, pdf, ocr, surface)
    }

    /// Session with caller-supplied engines.
    pub fn with_backends(
        config: IntakeConfig,
        pdf: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrEngine>,
        surface: Arc<dyn ReviewSurface>,
    ) -> Result<Self, IntakeError> {
        let backend = BackendClient::new(&config)?;
        Ok(Self {
            extractor: Extractor::new(pdf, ocr, &config),
            analysis: AnalysisClient::new(backend.clone()),
            submitter: Submitter::new(backend),
            desk: VerificationDesk::new(surface),
            status: Arc::new(StatusReporter::new(config.status_observer.clone())),
            run: Mutex::new(RunState::default()),
            config,
        })
    }

    fn run(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    // ── Selection & extraction ────────────────────────────────────────────

    /// Select a file on disk and extract its text.
    ///
    /// Any previous run is discarded first.
    pub async fn select_file(&self, path: impl AsRef<Path>) -> Result<ExtractionResult, IntakeError> {
        let generation = self.begin_run();
        let document = match Document::open(path).await {
            Ok(doc) => doc,
            Err(e) => return Err(self.fail_selection(generation, e)),
        };
        self.extract(generation, document).await
    }

    /// Select a document already in memory and extract its text.
    pub async fn select_bytes(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<ExtractionResult, IntakeError> {
        let generation = self.begin_run();
        let document = match Document::from_bytes(file_name, bytes) {
            Ok(doc) => doc,
            Err(e) => return Err(self.fail_selection(generation, e)),
        };
        self.extract(generation, document).await
    }

    fn begin_run(&self) -> u64 {
        let generation = self.run().discard();
        debug!("Starting run {}", generation);
        self.status.show_status(StatusLevel::Info, "Reading PDF file...");
        generation
    }

    fn fail_selection(&self, generation: u64, e: IntakeError) -> IntakeError {
        if let Err(stale) = self.run().check(generation) {
            return stale;
        }
        self.status.show_status(StatusLevel::Error, "Error reading PDF.");
        e
    }

    async fn extract(
        &self,
        generation: u64,
        document: Document,
    ) -> Result<ExtractionResult, IntakeError> {
        let document = Arc::new(document);
        let outcome = self.extractor.extract(&document, &self.status).await;

        let mut run = self.run();
        if let Err(stale) = run.check(generation) {
            drop(run);
            info!("Discarding extraction of '{}': run superseded", document.file_name());
            document.release_handle();
            return Err(stale);
        }

        match outcome {
            Ok(extraction) => {
                run.text = extraction.text.clone();
                run.extraction = Some(extraction.clone());
                run.document = Some(Arc::clone(&document));
                drop(run);

                if extraction.is_empty() {
                    self.status
                        .show_status(StatusLevel::Error, "Could not extract text.");
                } else {
                    self.status.show_status(
                        StatusLevel::Success,
                        "Text extracted! Please fill manual details and request analysis.",
                    );
                }
                Ok(extraction)
            }
            Err(e) => {
                drop(run);
                warn!("Extraction of '{}' failed: {}", document.file_name(), e);
                document.release_handle();
                self.status.show_status(StatusLevel::Error, "Error reading PDF.");
                Err(e)
            }
        }
    }

    /// Extraction output of the current run.
    pub fn extraction(&self) -> Option<ExtractionResult> {
        self.run().extraction.clone()
    }

    /// Text that the next [`analyze`](Self::analyze) will send.
    pub fn extracted_text(&self) -> String {
        self.run().text.clone()
    }

    /// Replace the text sent to analysis, e.g. after the user corrected OCR output.
    pub fn set_extracted_text(&self, text: impl Into<String>) -> Result<(), IntakeError> {
        let mut run = self.run();
        if run.document.is_none() {
            return Err(IntakeError::NoActiveRun {
                action: "edit",
                hint: "select a PDF first",
            });
        }
        run.ensure_open("edit")?;
        run.text = text.into();
        Ok(())
    }

    pub fn document(&self) -> Option<Arc<Document>> {
        self.run().document.clone()
    }

    // ── Analysis ──────────────────────────────────────────────────────────

    /// Analyse the current text and build a draft record.
    ///
    /// Every call mints a new bill id. Any earlier draft is replaced.
    ///
    /// # Errors
    /// * `Validation` — a required manual field is blank; nothing is sent
    /// * `NoActiveRun` — no text to analyse
    /// * `Remote` / `Network` / `MalformedResponse` — analysis failed; the
    ///   extracted text is kept
    pub async fn analyze(&self, manual: &ManualFields) -> Result<BillRecord, IntakeError> {
        if let Err(e) = manual.validate() {
            self.status.show_status(StatusLevel::Error, e.to_string());
            return Err(e);
        }

        let (generation, text) = {
            let run = self.run();
            run.ensure_open("analyze")?;
            if run.document.is_none() || run.text.trim().is_empty() {
                return Err(IntakeError::NoActiveRun {
                    action: "analyze",
                    hint: "select a PDF with readable text first",
                });
            }
            (run.generation, run.text.clone())
        };

        self.status
            .set_loading(true, "Fetching headers and processing...");
        let hints = self.analysis.fetch_headers().await;
        let outcome = self.analysis.analyze(&text).await;
        self.status.set_loading(false, "");

        let mut run = self.run();
        run.check(generation)?;
        let fields = match outcome {
            Ok(fields) => fields,
            Err(e) => {
                drop(run);
                self.status
                    .show_result(StatusLevel::Error, format!("Error: {e}"));
                return Err(e);
            }
        };

        let id = BillId::generate();
        let draft = BillRecord::draft(&id, &fields, manual);
        info!("Draft {} with {} fields", id, draft.len());

        run.header_hints = hints;
        run.draft = Some(draft.clone());
        run.finalized = None;
        Ok(draft)
    }

    pub fn draft(&self) -> Option<BillRecord> {
        self.run().draft.clone()
    }

    pub fn header_hints(&self) -> Vec<String> {
        self.run().header_hints.clone()
    }

    // ── Verification ──────────────────────────────────────────────────────

    /// Open the draft for human review and wait for confirmation.
    ///
    /// # Errors
    /// * `NoActiveRun` — no draft yet
    /// * `ReviewInProgress` — a review is already open and was focused instead
    /// * `ReviewAbandoned` — the reviewer closed the surface; the draft is kept
    pub async fn verify(&self) -> Result<BillRecord, IntakeError> {
        let (generation, draft, document, hints) = {
            let run = self.run();
            run.ensure_open("verify")?;
            match (&run.draft, &run.document) {
                (Some(draft), Some(doc)) => (
                    run.generation,
                    draft.clone(),
                    Arc::clone(doc),
                    run.header_hints.clone(),
                ),
                _ => {
                    return Err(IntakeError::NoActiveRun {
                        action: "verify",
                        hint: "request analysis first",
                    })
                }
            }
        };

        let finalized = match self.desk.open(&draft, &document, &hints).await {
            Ok(record) => record,
            Err(e) => {
                if !matches!(e, IntakeError::ReviewInProgress { .. }) {
                    self.status.show_status(StatusLevel::Error, e.to_string());
                }
                return Err(e);
            }
        };

        let mut run = self.run();
        run.check(generation)?;
        run.finalized = Some(finalized.clone());
        Ok(finalized)
    }

    pub fn finalized(&self) -> Option<BillRecord> {
        self.run().finalized.clone()
    }

    /// Whether a review surface is currently open.
    pub fn is_reviewing(&self) -> bool {
        self.desk.open_session().is_some()
    }

    // ── Submission ────────────────────────────────────────────────────────

    /// Save the finalized record together with the original file.
    ///
    /// A rejected save returns `Ok` with `success: false` and keeps the
    /// record and document, so calling `submit` again retries it. A
    /// successful save ends the run.
    pub async fn submit(&self) -> Result<SubmissionResult, IntakeError> {
        let (generation, record, document) = {
            let run = self.run();
            run.ensure_open("submit")?;
            match (&run.finalized, &run.document) {
                (Some(record), Some(doc)) => (run.generation, record.clone(), Arc::clone(doc)),
                _ => {
                    return Err(IntakeError::NoActiveRun {
                        action: "submit",
                        hint: "verify the draft first",
                    })
                }
            }
        };

        self.status
            .set_loading(true, "Uploading document and saving record...");
        let outcome = self.submitter.submit(&record, &document).await;
        self.status.set_loading(false, "");

        // A superseded run keeps its outcome but not the status channels.
        let mut run = self.run();
        if run.check(generation).is_err() {
            drop(run);
            match &outcome {
                Ok(result) => debug!(
                    "Save for superseded run {} finished (success={})",
                    generation, result.success
                ),
                Err(e) => debug!("Save for superseded run {} failed: {}", generation, e),
            }
            return outcome;
        }

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                drop(run);
                self.status
                    .show_result(StatusLevel::Error, format!("Save failed: {e}"));
                return Err(e);
            }
        };

        if !result.success {
            drop(run);
            let message = result.message.as_deref().unwrap_or_default();
            self.status
                .show_result(StatusLevel::Error, format!("Save failed: {message}"));
            return Ok(result);
        }

        run.completed = true;
        run.draft = None;
        run.finalized = None;
        drop(run);
        self.status
            .show_result(StatusLevel::Success, "Bill processed successfully.");
        Ok(result)
    }

    /// [`verify`](Self::verify) then [`submit`](Self::submit).
    pub async fn review_and_submit(&self) -> Result<SubmissionResult, IntakeError> {
        self.verify().await?;
        self.submit().await
    }

    /// Whether the current document has been saved.
    pub fn is_completed(&self) -> bool {
        self.run().completed
    }

    // ── Reset & status ────────────────────────────────────────────────────

    /// Start over: clear every status channel, discard the run and release
    /// the display handle. Work still in flight will come back stale.
    pub fn reset(&self) {
        let generation = self.run().discard();
        self.status.clear();
        info!("Session reset (run {})", generation);
    }

    /// Current run generation. Changes on every selection and reset.
    pub fn generation(&self) -> u64 {
        self.run().generation
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }
}

//! Verification: human review of a draft record before it is saved.
//!
//! The host UI implements [`ReviewSurface`]. The [`VerificationDesk`] hands
//! it a [`ReviewRequest`] (the form plus a one-shot reply channel) and waits.
//! The surface edits the request's copy of the fields and ends it with
//! [`ReviewRequest::confirm`] or [`ReviewRequest::dismiss`]; dropping the
//! request counts as dismissal, so an abandoned review always resolves.
//!
//! At most one review is open at a time. Asking for another while one is open
//! brings the existing surface to focus and fails with `ReviewInProgress`;
//! the open review's confirm remains the only way to resolve it.

use crate::error::IntakeError;
use crate::pipeline::input::Document;
use crate::record::{is_read_only_field, BillRecord};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// One control on the review form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub read_only: bool,
}

/// Everything a surface needs to render the review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewForm {
    pub session_id: u64,
    /// Controls in record order.
    pub fields: Vec<FormField>,
    /// Destination column names, when the backend provided them.
    pub header_hints: Vec<String>,
    pub file_name: String,
    /// Displayable copy of the document, if still held.
    pub document: Option<PathBuf>,
}

impl ReviewForm {
    fn new(session_id: u64, draft: &BillRecord, document: &Document, hints: &[String]) -> Self {
        Self {
            session_id,
            fields: draft
                .iter()
                .map(|(name, value)| FormField {
                    name: name.to_string(),
                    value: value.to_string(),
                    read_only: is_read_only_field(name),
                })
                .collect(),
            header_hints: hints.to_vec(),
            file_name: document.file_name().to_string(),
            document: document.display_path(),
        }
    }
}

/// How a review ended.
#[derive(Debug)]
enum ReviewDecision {
    Confirmed(BillRecord),
    Abandoned,
}

/// An open review: the editable form and its one-shot reply channel.
#[derive(Debug)]
pub struct ReviewRequest {
    form: ReviewForm,
    reply: Option<oneshot::Sender<ReviewDecision>>,
}

impl ReviewRequest {
    pub fn form(&self) -> &ReviewForm {
        &self.form
    }

    pub fn session_id(&self) -> u64 {
        self.form.session_id
    }

    /// Change an editable field.
    ///
    /// # Errors
    /// `Validation` if the field is unknown or read-only.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> Result<(), IntakeError> {
        let field = self
            .form
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| IntakeError::Validation(format!("No field named '{name}'")))?;
        if field.read_only {
            return Err(IntakeError::Validation(format!(
                "Field '{name}' is read-only"
            )));
        }
        field.value = value.into();
        Ok(())
    }

    /// Snapshot the current values and resolve the review.
    pub fn confirm(mut self) {
        let record: BillRecord = self
            .form
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect();
        self.send(ReviewDecision::Confirmed(record));
    }

    /// Close the review without confirming.
    pub fn dismiss(mut self) {
        self.send(ReviewDecision::Abandoned);
    }

    fn send(&mut self, decision: ReviewDecision) {
        if let Some(tx) = self.reply.take() {
            // The desk may have stopped waiting; nothing to do then.
            let _ = tx.send(decision);
        }
    }
}

impl Drop for ReviewRequest {
    fn drop(&mut self) {
        self.send(ReviewDecision::Abandoned);
    }
}

/// The host's review UI.
pub trait ReviewSurface: Send + Sync {
    /// Show a new review. The surface owns `request` until it confirms,
    /// dismisses or drops it.
    fn present(&self, request: ReviewRequest);

    /// Bring the already-open review to the front.
    fn focus(&self, session_id: u64);
}

/// Opens reviews and guarantees at most one is live.
pub struct VerificationDesk {
    surface: Arc<dyn ReviewSurface>,
    open: Mutex<Option<u64>>,
    next_id: AtomicU64,
}

impl VerificationDesk {
    pub fn new(surface: Arc<dyn ReviewSurface>) -> Self {
        Self {
            surface,
            open: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<u64>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Id of the open review, if any.
    pub fn open_session(&self) -> Option<u64> {
        *self.slot()
    }

    /// Present `draft` for review and wait for the outcome.
    ///
    /// Read-only fields in the returned record always carry their draft value.
    ///
    /// # Errors
    /// * `ReviewInProgress` — another review is open; it was focused instead
    /// * `ReviewAbandoned` — the surface was closed without confirming
    pub async fn open(
        &self,
        draft: &BillRecord,
        document: &Document,
        header_hints: &[String],
    ) -> Result<BillRecord, IntakeError> {
        let claimed = {
            let mut slot = self.slot();
            match *slot {
                Some(existing) => Err(existing),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    *slot = Some(id);
                    Ok(id)
                }
            }
        };
        // The slot lock is released before calling back into the surface.
        let session_id = match claimed {
            Ok(id) => id,
            Err(existing) => {
                debug!("Review {} already open; focusing", existing);
                self.surface.focus(existing);
                return Err(IntakeError::ReviewInProgress {
                    session_id: existing,
                });
            }
        };
        let _closing = CloseOnDrop { desk: self };

        let (tx, rx) = oneshot::channel();
        let request = ReviewRequest {
            form: ReviewForm::new(session_id, draft, document, header_hints),
            reply: Some(tx),
        };
        info!(
            "Opening review {} ({} fields) for '{}'",
            session_id,
            draft.len(),
            document.file_name()
        );
        self.surface.present(request);

        match rx.await {
            Ok(ReviewDecision::Confirmed(edited)) => {
                info!("Review {} confirmed", session_id);
                Ok(finalize(draft, &edited))
            }
            Ok(ReviewDecision::Abandoned) | Err(_) => {
                info!("Review {} abandoned", session_id);
                Err(IntakeError::ReviewAbandoned)
            }
        }
    }
}

/// Frees the desk's slot however `open` ends, including cancellation.
struct CloseOnDrop<'a> {
    desk: &'a VerificationDesk,
}

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        *self.desk.slot() = None;
    }
}

/// Build the finalized record: the draft's fields in draft order, editable
/// ones taking the reviewer's value.
fn finalize(draft: &BillRecord, edited: &BillRecord) -> BillRecord {
    draft
        .iter()
        .map(|(name, original)| {
            let value = if is_read_only_field(name) {
                original
            } else {
                edited.get(name).unwrap_or(original)
            };
            (name.to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BillId, ManualFields, BILL_ID_FIELD, HOD_APPROVAL_STATUS_FIELD};
    use std::sync::atomic::AtomicUsize;

    const PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    fn draft() -> BillRecord {
        let analysed: BillRecord = [("Vendor", "Acme")].into_iter().collect();
        let manual = ManualFields {
            bill_given_by: "Priya".into(),
            added_by: "Sam".into(),
            ..Default::default()
        };
        BillRecord::draft(&BillId::generate(), &analysed, &manual)
    }

    /// Keeps presented requests so the test decides when to resolve them.
    #[derive(Default)]
    struct HeldSurface {
        held: Mutex<Vec<ReviewRequest>>,
        focused: AtomicUsize,
    }

    impl ReviewSurface for HeldSurface {
        fn present(&self, request: ReviewRequest) {
            self.held.lock().unwrap().push(request);
        }

        fn focus(&self, _session_id: u64) {
            self.focused.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Tries to edit everything, then confirms.
    struct GreedySurface;

    impl ReviewSurface for GreedySurface {
        fn present(&self, mut request: ReviewRequest) {
            let names: Vec<String> =
                request.form().fields.iter().map(|f| f.name.clone()).collect();
            for name in names {
                let _ = request.set_value(&name, "EDITED");
            }
            request.confirm();
        }

        fn focus(&self, _session_id: u64) {}
    }

    #[test]
    fn form_marks_read_only_fields() {
        let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
        let form = ReviewForm::new(1, &draft(), &doc, &[]);
        let ro: Vec<_> = form
            .fields
            .iter()
            .filter(|f| f.read_only)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            ro,
            vec![BILL_ID_FIELD, "HOD Approval Status", "Final Approval Status"]
        );
        assert_eq!(form.document, doc.display_path());
    }

    #[test]
    fn set_value_rejects_read_only_and_unknown() {
        let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
        let (tx, _rx) = oneshot::channel();
        let mut req = ReviewRequest {
            form: ReviewForm::new(1, &draft(), &doc, &[]),
            reply: Some(tx),
        };
        assert!(req.set_value(BILL_ID_FIELD, "BID-0").is_err());
        assert!(req.set_value(HOD_APPROVAL_STATUS_FIELD, "Approved").is_err());
        assert!(req.set_value("Nope", "x").is_err());
        assert!(req.set_value("Vendor", "Acme Corp").is_ok());
    }

    #[tokio::test]
    async fn read_only_fields_survive_any_edit() {
        let desk = VerificationDesk::new(Arc::new(GreedySurface));
        let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
        let draft = draft();

        let finalized = desk.open(&draft, &doc, &[]).await.unwrap();
        for (name, value) in finalized.iter() {
            if is_read_only_field(name) {
                assert_eq!(Some(value), draft.get(name), "field {name}");
            } else {
                assert_eq!(value, "EDITED", "field {name}");
            }
        }
        assert!(desk.open_session().is_none());
    }

    #[tokio::test]
    async fn second_open_focuses_existing() {
        let surface = Arc::new(HeldSurface::default());
        let desk = Arc::new(VerificationDesk::new(surface.clone()));
        let draft = draft();

        let first = {
            let desk = Arc::clone(&desk);
            let draft = draft.clone();
            tokio::spawn(async move {
                let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
                desk.open(&draft, &doc, &[]).await
            })
        };
        while surface.held.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let doc = Document::from_bytes("b.pdf", PDF.to_vec()).unwrap();
        let second = desk.open(&draft, &doc, &[]).await;
        assert!(matches!(second, Err(IntakeError::ReviewInProgress { .. })));
        assert_eq!(surface.focused.load(Ordering::SeqCst), 1);
        assert_eq!(surface.held.lock().unwrap().len(), 1, "no second surface");

        let req = surface.held.lock().unwrap().pop().unwrap();
        req.confirm();
        let finalized = first.await.unwrap().unwrap();
        assert_eq!(finalized, draft);
        assert!(desk.open_session().is_none());
    }

    /// Reads the desk back from inside `focus`, as a UI raising its window would.
    #[derive(Default)]
    struct ReentrantSurface {
        desk: std::sync::OnceLock<std::sync::Weak<VerificationDesk>>,
        held: Mutex<Vec<ReviewRequest>>,
        seen_on_focus: Mutex<Option<Option<u64>>>,
    }

    impl ReviewSurface for ReentrantSurface {
        fn present(&self, request: ReviewRequest) {
            self.held.lock().unwrap().push(request);
        }

        fn focus(&self, _session_id: u64) {
            let open = self
                .desk
                .get()
                .and_then(|d| d.upgrade())
                .and_then(|d| d.open_session());
            *self.seen_on_focus.lock().unwrap() = Some(open);
        }
    }

    #[tokio::test]
    async fn focus_may_query_the_desk() {
        let surface = Arc::new(ReentrantSurface::default());
        let desk = Arc::new(VerificationDesk::new(surface.clone()));
        surface.desk.set(Arc::downgrade(&desk)).unwrap();
        let draft = draft();

        let first = {
            let desk = Arc::clone(&desk);
            let draft = draft.clone();
            tokio::spawn(async move {
                let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
                desk.open(&draft, &doc, &[]).await
            })
        };
        while surface.held.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        let open_id = desk.open_session();
        assert!(open_id.is_some());

        let doc = Document::from_bytes("b.pdf", PDF.to_vec()).unwrap();
        let second = desk.open(&draft, &doc, &[]).await;
        assert!(matches!(second, Err(IntakeError::ReviewInProgress { .. })));
        assert_eq!(*surface.seen_on_focus.lock().unwrap(), Some(open_id));

        let req = surface.held.lock().unwrap().pop().unwrap();
        req.dismiss();
        assert!(matches!(
            first.await.unwrap(),
            Err(IntakeError::ReviewAbandoned)
        ));
    }

    #[tokio::test]
    async fn dropping_request_abandons() {
        struct DropSurface;
        impl ReviewSurface for DropSurface {
            fn present(&self, request: ReviewRequest) {
                drop(request);
            }
            fn focus(&self, _session_id: u64) {}
        }

        let desk = VerificationDesk::new(Arc::new(DropSurface));
        let doc = Document::from_bytes("a.pdf", PDF.to_vec()).unwrap();
        let err = desk.open(&draft(), &doc, &[]).await.unwrap_err();
        assert!(matches!(err, IntakeError::ReviewAbandoned));
        assert!(desk.open_session().is_none(), "slot freed after abandon");
    }

    #[test]
    fn finalize_keeps_draft_order_and_read_only_values() {
        let draft = draft();
        let reversed: Vec<_> = draft.iter().collect();
        let mut edited: BillRecord = reversed.into_iter().rev().collect();
        edited.insert("Vendor", "Acme Corp");
        edited.insert(BILL_ID_FIELD, "BID-1");

        let out = finalize(&draft, &edited);
        assert_eq!(
            out.names().collect::<Vec<_>>(),
            draft.names().collect::<Vec<_>>()
        );
        assert_eq!(out.get("Vendor"), Some("Acme Corp"));
        assert_eq!(out.bill_id(), draft.bill_id());
    }
}

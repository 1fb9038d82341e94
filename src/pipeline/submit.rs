//! Submission: finalized record + original file → durable storage.
//!
//! The file travels base64-encoded inside the JSON body alongside the record
//! and the original file name. A rejected save is *not* an `Err`: it is a
//! [`SubmissionResult`] with `success == false`, so the caller keeps the
//! record and document and may submit again.

use crate::backend::{BackendClient, BackendRequest};
use crate::error::IntakeError;
use crate::pipeline::encode::{encode_file, strip_data_url_prefix};
use crate::pipeline::input::Document;
use crate::record::{BillId, BillRecord, BILL_ID_FIELD};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a `save` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Posts finalized records to the backend's `save` action.
#[derive(Debug, Clone)]
pub struct Submitter {
    backend: BackendClient,
}

impl Submitter {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Encode `document` and post it with `record`.
    ///
    /// # Errors
    /// `Validation` when the record has no well-formed bill id (nothing is
    /// sent), or when the call itself cannot complete (`Network`,
    /// `MalformedResponse`). A backend refusal is `Ok` with `success: false`.
    pub async fn submit(
        &self,
        record: &BillRecord,
        document: &Document,
    ) -> Result<SubmissionResult, IntakeError> {
        let bill_id = record.bill_id().unwrap_or_default();
        if !BillId::is_well_formed(bill_id) {
            return Err(IntakeError::Validation(format!(
                "record has no valid {BILL_ID_FIELD} (got '{bill_id}')"
            )));
        }

        let encoded = encode_file(document.bytes());
        let file_base64 = strip_data_url_prefix(&encoded);
        info!(
            "Saving record {} with '{}' ({} bytes)",
            bill_id,
            document.file_name(),
            document.bytes().len()
        );

        let reply = self
            .backend
            .call(&BackendRequest::Save {
                data: record,
                file_base64,
                file_name: document.file_name(),
            })
            .await?;

        if reply.is_success() {
            Ok(SubmissionResult {
                success: true,
                message: reply.message,
            })
        } else {
            let message = reply.failure_message();
            warn!("save rejected: {}", message);
            Ok(SubmissionResult {
                success: false,
                message: Some(message),
            })
        }
    }
}

//! Analysis client: extracted text → proposed field/value record.
//!
//! The structured-extraction algorithm lives behind the backend. Here we only
//! frame the request, interpret the envelope and convert `data` into an
//! ordered [`DraftFields`].

use crate::backend::{BackendClient, BackendRequest};
use crate::error::IntakeError;
use crate::record::{BillRecord, DraftFields};
use tracing::{debug, info, warn};

/// Talks to the backend's `getHeaders` and `analyze` actions.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    backend: BackendClient,
}

impl AnalysisClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Column names of the destination store, used as an alignment hint.
    ///
    /// Best-effort: any failure is logged and yields an empty list.
    pub async fn fetch_headers(&self) -> Vec<String> {
        match self.backend.call(&BackendRequest::GetHeaders).await {
            Ok(reply) if reply.is_success() => {
                let headers = reply.headers.unwrap_or_default();
                debug!("Backend reported {} headers", headers.len());
                headers
            }
            Ok(reply) => {
                warn!("getHeaders: {}", reply.failure_message());
                Vec::new()
            }
            Err(e) => {
                warn!("getHeaders failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Ask the backend to analyse `text`.
    ///
    /// # Errors
    /// * `Remote` — the backend replied with a non-success status; carries its message
    /// * `Network` / `MalformedResponse` — the call could not complete
    pub async fn analyze(&self, text: &str) -> Result<DraftFields, IntakeError> {
        info!("Analysing {} chars of text", text.len());
        let reply = self.backend.call(&BackendRequest::Analyze { text }).await?;

        if !reply.is_success() {
            return Err(IntakeError::Remote {
                action: "analyze".to_string(),
                message: reply.failure_message(),
            });
        }

        let fields = reply
            .data
            .map(BillRecord::from_json_map)
            .unwrap_or_default();
        debug!("Analysis returned {} fields", fields.len());
        Ok(fields)
    }
}

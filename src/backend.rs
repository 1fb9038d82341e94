//! Remote backend: JSON wire protocol and HTTP transport.
//!
//! The backend exposes one endpoint. Every operation is a POST whose JSON
//! body carries an `action` discriminator:
//!
//! | action       | request                                  | response                          |
//! |--------------|------------------------------------------|-----------------------------------|
//! | `getHeaders` | `{action}`                               | `{status, headers}`               |
//! | `analyze`    | `{action, text}`                         | `{status, data, message?}`        |
//! | `save`       | `{action, data, fileBase64, fileName}`   | `{status, message?}`              |
//!
//! A reply counts as successful only when `status` is the literal string
//! `"success"`. The body is sent as `text/plain` so script-hosted backends
//! accept it without a CORS preflight.
//!
//! The envelope is decoded whatever the HTTP status, so a `500` carrying
//! `{"status":"error","message":…}` is a refusal with the backend's message.
//! Only a failure with no envelope (connection error, non-2xx without a JSON
//! body) is a transport failure. Transport failures are retried according to
//! the configured [`RetryPolicy`]; a refusal is never retried.

use crate::config::{IntakeConfig, RetryPolicy};
use crate::error::IntakeError;
use crate::record::BillRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Literal status string that marks a successful reply.
pub const SUCCESS: &str = "success";

/// Request body for one backend action.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BackendRequest<'a> {
    GetHeaders,
    Analyze {
        text: &'a str,
    },
    Save {
        data: &'a BillRecord,
        #[serde(rename = "fileBase64")]
        file_base64: &'a str,
        #[serde(rename = "fileName")]
        file_name: &'a str,
    },
}

impl BackendRequest<'_> {
    pub fn action(&self) -> &'static str {
        match self {
            BackendRequest::GetHeaders => "getHeaders",
            BackendRequest::Analyze { .. } => "analyze",
            BackendRequest::Save { .. } => "save",
        }
    }
}

/// Reply envelope shared by every action; unused fields stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl BackendReply {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS)
    }

    /// Whether the body carried a `status` or `message` at all.
    pub fn is_envelope(&self) -> bool {
        self.status.is_some() || self.message.is_some()
    }

    /// The backend's message, or a generic one when it sent none.
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Unknown error from backend".to_string())
    }
}

/// HTTP client bound to the backend endpoint.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl BackendClient {
    pub fn new(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| IntakeError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            retry: config.network_retry,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `request`, retrying transport failures per the retry policy.
    ///
    /// Returns the decoded envelope whatever its `status`; callers decide
    /// what a non-success reply means for their action.
    pub async fn call(&self, request: &BackendRequest<'_>) -> Result<BackendReply, IntakeError> {
        let action = request.action();
        let body = serde_json::to_string(request)
            .map_err(|e| IntakeError::Internal(format!("encode '{action}' request: {e}")))?;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    action,
                    attempt,
                    self.retry.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            match self.post_once(action, &body).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    warn!("{}: attempt {} failed: {}", action, attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(&self, action: &str, body: &str) -> Result<BackendReply, IntakeError> {
        debug!("POST {} action={} ({} bytes)", self.endpoint, action, body.len());

        let network = |detail: String| IntakeError::Network {
            action: action.to_string(),
            detail,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| network(e.to_string()))?;

        match serde_json::from_str::<BackendReply>(&text) {
            Ok(reply) if status.is_success() || reply.is_envelope() => {
                if !status.is_success() {
                    debug!("{}: HTTP {} with envelope status={:?}", action, status, reply.status);
                }
                Ok(reply)
            }
            Ok(_) => Err(network(format!("HTTP {status}"))),
            Err(_) if !status.is_success() => Err(network(format!("HTTP {status}"))),
            Err(e) => Err(IntakeError::MalformedResponse {
                action: action.to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, retry: RetryPolicy) -> BackendClient {
        let config = IntakeConfig::builder()
            .endpoint(server.uri())
            .network_retry(retry)
            .build()
            .unwrap();
        BackendClient::new(&config).unwrap()
    }

    #[test]
    fn get_headers_request_shape() {
        let v = serde_json::to_value(BackendRequest::GetHeaders).unwrap();
        assert_eq!(v, json!({"action": "getHeaders"}));
    }

    #[test]
    fn analyze_request_shape() {
        let v = serde_json::to_value(BackendRequest::Analyze { text: "Total: 500" }).unwrap();
        assert_eq!(v, json!({"action": "analyze", "text": "Total: 500"}));
    }

    #[test]
    fn save_request_shape() {
        let record: BillRecord = [("Unique ID", "BID-1"), ("Vendor", "Acme")]
            .into_iter()
            .collect();
        let req = BackendRequest::Save {
            data: &record,
            file_base64: "JVBERi0=",
            file_name: "invoice.pdf",
        };
        assert_eq!(req.action(), "save");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "action": "save",
                "data": {"Unique ID": "BID-1", "Vendor": "Acme"},
                "fileBase64": "JVBERi0=",
                "fileName": "invoice.pdf"
            })
        );
    }

    #[test]
    fn reply_success_requires_literal_status() {
        let ok: BackendReply = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(ok.is_success());

        let upper: BackendReply = serde_json::from_str(r#"{"status":"SUCCESS"}"#).unwrap();
        assert!(!upper.is_success());

        let missing: BackendReply = serde_json::from_str(r#"{"message":"x"}"#).unwrap();
        assert!(!missing.is_success());
        assert_eq!(missing.failure_message(), "x");
    }

    #[test]
    fn failure_message_falls_back() {
        let r: BackendReply = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(r.failure_message(), "Unknown error from backend");
    }

    #[tokio::test]
    async fn error_status_with_envelope_is_a_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"action": "getHeaders"})))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"status": "error", "message": "Sheet locked"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server, RetryPolicy::new(2, 1))
            .call(&BackendRequest::GetHeaders)
            .await
            .unwrap();
        assert!(!reply.is_success());
        assert_eq!(reply.failure_message(), "Sheet locked");
    }

    #[tokio::test]
    async fn error_status_without_envelope_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "headers": ["Vendor"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server, RetryPolicy::new(1, 1))
            .call(&BackendRequest::GetHeaders)
            .await
            .unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.headers, Some(vec!["Vendor".to_string()]));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, RetryPolicy::new(2, 1))
            .call(&BackendRequest::GetHeaders)
            .await
            .unwrap_err();
        match err {
            IntakeError::Network { action, detail } => {
                assert_eq!(action, "getHeaders");
                assert!(detail.contains("502"), "{detail}");
            }
            other => panic!("expected Network, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_on_success_is_malformed_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, RetryPolicy::new(3, 1))
            .call(&BackendRequest::GetHeaders)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::MalformedResponse { .. }), "{err:?}");
    }
}

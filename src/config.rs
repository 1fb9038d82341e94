//! Configuration types for the bill intake pipeline.
//!
//! All pipeline behaviour is controlled through [`IntakeConfig`], built via
//! its [`IntakeConfigBuilder`]. Every knob lives in one struct so a host can
//! log it, share it across tasks and diff two runs.

use crate::error::IntakeError;
use crate::status::StatusCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an intake session.
///
/// # Example
/// ```rust
/// use edgequake_bill_intake::{IntakeConfig, RetryPolicy};
///
/// let config = IntakeConfig::builder()
///     .endpoint("https://script.example.com/macros/s/abc/exec")
///     .ocr_scale(2.0)
///     .network_retry(RetryPolicy::new(2, 250))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// URL of the remote backend. Every action is POSTed here.
    pub endpoint: String,

    /// Upscale factor applied when rasterising a page for OCR. Default: 2.0.
    pub ocr_scale: f32,

    /// Cap on either edge of a rasterised page, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Tesseract language code. Default: "eng".
    pub ocr_language: String,

    /// Tesseract executable. Default: "tesseract" (resolved through `PATH`).
    pub tesseract_path: PathBuf,

    /// Directory holding the pdfium shared library. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Retry policy for backend calls. Default: no retry.
    pub network_retry: RetryPolicy,

    /// Retry policy for OCR on a single page. Default: no retry.
    pub ocr_retry: RetryPolicy,

    /// Per-request timeout. Default: none; a hung backend blocks the run.
    pub request_timeout_secs: Option<u64>,

    /// Observer notified of every status change.
    pub status_observer: Option<StatusCallback>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            ocr_scale: 2.0,
            max_rendered_pixels: 4000,
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            pdfium_lib_path: None,
            password: None,
            network_retry: RetryPolicy::default(),
            ocr_retry: RetryPolicy::default(),
            request_timeout_secs: None,
            status_observer: None,
        }
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("endpoint", &self.endpoint)
            .field("ocr_scale", &self.ocr_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_path", &self.tesseract_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("network_retry", &self.network_retry)
            .field("ocr_retry", &self.ocr_retry)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "status_observer",
                &self.status_observer.as_ref().map(|_| "<dyn StatusObserver>"),
            )
            .finish()
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IntakeConfig`].
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn ocr_scale(mut self, scale: f32) -> Self {
        self.config.ocr_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn network_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.network_retry = policy;
        self
    }

    pub fn ocr_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.ocr_retry = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn status_observer(mut self, observer: StatusCallback) -> Self {
        self.config.status_observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        let endpoint = c.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(IntakeError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                c.endpoint
            )));
        }
        if !(0.5..=8.0).contains(&c.ocr_scale) {
            return Err(IntakeError::InvalidConfig(format!(
                "OCR scale must be 0.5–8.0, got {}",
                c.ocr_scale
            )));
        }
        if c.max_rendered_pixels < 100 {
            return Err(IntakeError::InvalidConfig(format!(
                "max rendered pixels must be ≥ 100, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(IntakeError::InvalidConfig("OCR language is empty".into()));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(IntakeError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// How often, and how patiently, a failed call is attempted again.
///
/// The default performs a single attempt. When retries are enabled the delay
/// doubles after each attempt: `backoff_ms`, `2 × backoff_ms`, `4 × backoff_ms`…
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay to wait before `attempt` (1-indexed retry number).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = IntakeConfig::default();
        assert_eq!(c.ocr_scale, 2.0);
        assert_eq!(c.ocr_language, "eng");
        assert_eq!(c.network_retry.max_retries, 0);
        assert_eq!(c.ocr_retry.max_retries, 0);
        assert!(c.request_timeout_secs.is_none());
    }

    #[test]
    fn build_requires_http_endpoint() {
        assert!(IntakeConfig::builder().build().is_err());
        assert!(IntakeConfig::builder()
            .endpoint("ftp://example.com")
            .build()
            .is_err());
        assert!(IntakeConfig::builder()
            .endpoint("https://example.com/exec")
            .build()
            .is_ok());
    }

    #[test]
    fn build_rejects_out_of_range_scale() {
        let err = IntakeConfig::builder()
            .endpoint("http://localhost:9000")
            .ocr_scale(20.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("OCR scale"));
    }

    #[test]
    fn retry_delay_doubles() {
        let p = RetryPolicy::new(3, 500);
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn debug_redacts_password() {
        let c = IntakeConfig::builder()
            .endpoint("http://localhost")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}

//! Extractor: document bytes → plain text.
//!
//! ## Algorithm
//!
//! 1. Read every page's native text layer, in order. A page with fragments
//!    contributes them joined by single spaces plus a newline; a page without
//!    contributes nothing. The result is trimmed.
//! 2. If that is empty, the **whole document** switches to OCR: each page is
//!    rasterised at `ocr_scale` and recognised, strictly one page after
//!    another, each page's text followed by a newline. The result is trimmed.
//!
//! The fallback is all-or-nothing. A document with text on some pages and
//! none on others keeps the text-layer result and never OCRs the empty pages.
//!
//! OCR progress is reported per page through the [`StatusReporter`] because
//! recognition is orders of magnitude slower than reading a text layer.

use crate::config::{IntakeConfig, RetryPolicy};
use crate::error::IntakeError;
use crate::pipeline::input::Document;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::PdfBackend;
use crate::status::{StatusLevel, StatusReporter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where the extracted text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextSource {
    TextLayer,
    Ocr,
}

/// Output of [`Extractor::extract`]. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Per-page text, one entry per page in page order.
    pub pages: Vec<String>,
    pub source: TextSource,
    /// Trimmed concatenation of every page.
    pub text: String,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Turns a [`Document`] into text, with OCR fallback.
pub struct Extractor {
    pdf: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    scale: f32,
    max_pixels: u32,
    password: Option<String>,
    ocr_retry: RetryPolicy,
}

impl Extractor {
    pub fn new(pdf: Arc<dyn PdfBackend>, ocr: Arc<dyn OcrEngine>, config: &IntakeConfig) -> Self {
        Self {
            pdf,
            ocr,
            scale: config.ocr_scale,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            ocr_retry: config.ocr_retry,
        }
    }

    /// Extract the document's text.
    ///
    /// # Errors
    /// * `Extraction` — the document cannot be parsed at all
    /// * `Ocr` — the engine failed to start or failed on a page
    pub async fn extract(
        &self,
        document: &Document,
        status: &StatusReporter,
    ) -> Result<ExtractionResult, IntakeError> {
        let start = Instant::now();
        let fragments = self.read_text_layer(document).await?;
        let text = join_text_layer(&fragments);

        if !text.is_empty() {
            info!(
                "Text layer: {} pages, {} chars in {}ms",
                fragments.len(),
                text.len(),
                start.elapsed().as_millis()
            );
            return Ok(ExtractionResult {
                pages: fragments.iter().map(|f| f.join(" ")).collect(),
                source: TextSource::TextLayer,
                text,
            });
        }

        status.show_status(
            StatusLevel::Info,
            "No text layer found. Starting OCR (this takes time)...",
        );
        let pages = self.run_ocr(document, fragments.len(), status).await?;
        let text = join_ocr_pages(&pages);
        info!(
            "OCR: {} pages, {} chars in {}ms",
            pages.len(),
            text.len(),
            start.elapsed().as_millis()
        );

        Ok(ExtractionResult {
            pages,
            source: TextSource::Ocr,
            text,
        })
    }

    async fn read_text_layer(&self, document: &Document) -> Result<Vec<Vec<String>>, IntakeError> {
        let pdf = Arc::clone(&self.pdf);
        let bytes = document.shared_bytes();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || pdf.text_layer(&bytes, password.as_deref()))
            .await
            .map_err(|e| IntakeError::Internal(format!("Text-layer task panicked: {e}")))?
            .map_err(|e| with_file_name(e, document.file_name()))
    }

    async fn run_ocr(
        &self,
        document: &Document,
        total: usize,
        status: &StatusReporter,
    ) -> Result<Vec<String>, IntakeError> {
        self.ocr.start().await?;
        let result = self.ocr_pages(document, total, status).await;
        self.ocr.stop().await;
        result
    }

    async fn ocr_pages(
        &self,
        document: &Document,
        total: usize,
        status: &StatusReporter,
    ) -> Result<Vec<String>, IntakeError> {
        let mut pages = Vec::with_capacity(total);
        for idx in 0..total {
            let page_num = idx + 1;
            status.ocr_page(page_num, total);

            let image = self.render(document, idx).await?;
            let text = self.recognize_with_retry(&image, page_num).await?;
            debug!("OCR page {}/{}: {} chars", page_num, total, text.len());
            pages.push(text);
        }
        Ok(pages)
    }

    async fn render(
        &self,
        document: &Document,
        idx: usize,
    ) -> Result<image::DynamicImage, IntakeError> {
        let pdf = Arc::clone(&self.pdf);
        let bytes = document.shared_bytes();
        let password = self.password.clone();
        let (scale, max_pixels) = (self.scale, self.max_pixels);

        tokio::task::spawn_blocking(move || {
            pdf.render_page(&bytes, password.as_deref(), idx, scale, max_pixels)
        })
        .await
        .map_err(|e| IntakeError::Internal(format!("Render task panicked: {e}")))?
        .map_err(|e| with_file_name(e, document.file_name()))
    }

    async fn recognize_with_retry(
        &self,
        image: &image::DynamicImage,
        page_num: usize,
    ) -> Result<String, IntakeError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.ocr_retry.delay_for(attempt);
                warn!(
                    "OCR page {}: retry {}/{} after {}ms",
                    page_num,
                    attempt,
                    self.ocr_retry.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            match self.ocr.recognize(image).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.ocr_retry.max_retries => {
                    warn!("OCR page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(with_page(e, page_num)),
            }
        }
    }
}

/// Join text-layer fragments: spaces within a page, newline after each page
/// that has any text, then trim.
pub fn join_text_layer(pages: &[Vec<String>]) -> String {
    let mut combined = String::new();
    for fragments in pages.iter().filter(|f| !f.is_empty()) {
        combined.push_str(&fragments.join(" "));
        combined.push('\n');
    }
    combined.trim().to_string()
}

/// Join OCR output: every page followed by a newline, then trim.
pub fn join_ocr_pages(pages: &[String]) -> String {
    let mut combined = String::new();
    for text in pages {
        combined.push_str(text);
        combined.push('\n');
    }
    combined.trim().to_string()
}

fn with_file_name(e: IntakeError, name: &str) -> IntakeError {
    match e {
        IntakeError::Extraction { file_name, detail } if file_name.is_empty() => {
            IntakeError::Extraction {
                file_name: name.to_string(),
                detail,
            }
        }
        other => other,
    }
}

fn with_page(e: IntakeError, page_num: usize) -> IntakeError {
    match e {
        IntakeError::Ocr { page: None, detail } => IntakeError::Ocr {
            page: Some(page_num),
            detail,
        },
        other => other,
    }
}

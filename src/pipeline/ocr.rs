//! OCR engines: raster page → recognised text.
//!
//! The extractor drives an [`OcrEngine`] one page at a time: `start` once,
//! `recognize` per page in order, `stop` once. Engines are never invoked
//! concurrently, which bounds peak memory to one rendered page.
//!
//! [`TesseractEngine`] shells out to the `tesseract` CLI, the most widely
//! available engine. Each page is written to a temporary PNG, recognised to
//! stdout, and the temporary directory is removed when the call returns.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Converts a raster image of a page into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Prepare the engine. Called once before the first page.
    async fn start(&self) -> Result<(), IntakeError> {
        Ok(())
    }

    /// Recognise the text on one rasterised page.
    async fn recognize(&self, page: &DynamicImage) -> Result<String, IntakeError>;

    /// Release engine resources. Called once after the last page, even on failure.
    async fn stop(&self) {}
}

/// Tesseract OCR via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(config.tesseract_path.clone(), config.ocr_language.clone())
    }

    fn spawn_error(&self, e: std::io::Error) -> IntakeError {
        let detail = if e.kind() == std::io::ErrorKind::NotFound {
            format!(
                "{} not found (install tesseract-ocr)",
                self.binary.display()
            )
        } else {
            e.to_string()
        };
        IntakeError::Ocr { page: None, detail }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn start(&self) -> Result<(), IntakeError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(IntakeError::Ocr {
                page: None,
                detail: format!(
                    "{} --version exited with {}",
                    self.binary.display(),
                    output.status
                ),
            });
        }
        debug!(
            "OCR engine ready: {}",
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("tesseract")
        );
        Ok(())
    }

    async fn recognize(&self, page: &DynamicImage) -> Result<String, IntakeError> {
        let png = encode_png(page).map_err(|e| IntakeError::Ocr {
            page: None,
            detail: format!("PNG encoding failed: {e}"),
        })?;

        let dir = TempDir::new().map_err(|e| IntakeError::Ocr {
            page: None,
            detail: format!("temp dir: {e}"),
        })?;
        let image_path = dir.path().join("page.png");
        tokio::fs::write(&image_path, &png)
            .await
            .map_err(|e| IntakeError::Ocr {
                page: None,
                detail: format!("temp image: {e}"),
            })?;

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(IntakeError::Ocr {
                page: None,
                detail: format!(
                    "tesseract failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

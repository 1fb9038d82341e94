//! Input: turn a selected file into the run's [`Document`].
//!
//! A document owns the raw bytes, the original file name and a *displayable
//! handle*: a temporary copy of the file on disk that a review surface can
//! open next to the form. The handle lives exactly as long as the document is
//! current. [`Document::release_handle`] deletes it, and the orchestrator
//! calls it before a replacement document is created.
//!
//! We validate the PDF magic bytes (`%PDF`) up front so callers get a
//! meaningful error rather than a parser failure deep inside pdfium.

use crate::error::IntakeError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// On-disk copy of the document for human review.
#[derive(Debug)]
pub struct DisplayHandle {
    file: NamedTempFile,
}

impl DisplayHandle {
    fn create(bytes: &[u8], file_name: &str) -> Result<Self, IntakeError> {
        use std::io::Write;

        let suffix = Path::new(file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".pdf".to_string());

        let mut file = tempfile::Builder::new()
            .prefix("bill-intake-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| IntakeError::Internal(format!("display handle: {e}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| IntakeError::Internal(format!("display handle write: {e}")))?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// The document being processed by the active run.
#[derive(Debug)]
pub struct Document {
    bytes: Arc<[u8]>,
    file_name: String,
    handle: Mutex<Option<DisplayHandle>>,
}

impl Document {
    /// Wrap bytes already in memory. Fails with `NotAPdf` on a bad header.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, IntakeError> {
        let file_name = file_name.into();
        check_magic(&file_name, &bytes)?;

        let handle = DisplayHandle::create(&bytes, &file_name)?;
        debug!(
            "Document '{}' ({} bytes) → {}",
            file_name,
            bytes.len(),
            handle.path().display()
        );

        Ok(Self {
            bytes: Arc::from(bytes),
            file_name,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Read a document from disk.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        info!("Reading {}", path.display());

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| IntakeError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        Self::from_bytes(file_name, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, for blocking work on another thread.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn handle(&self) -> MutexGuard<'_, Option<DisplayHandle>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Path of the displayable copy, or `None` once released.
    pub fn display_path(&self) -> Option<PathBuf> {
        self.handle().as_ref().map(|h| h.path().to_path_buf())
    }

    /// Delete the displayable copy. Idempotent.
    pub fn release_handle(&self) {
        if let Some(handle) = self.handle().take() {
            debug!("Releasing display handle {}", handle.path().display());
        }
    }
}

fn check_magic(file_name: &str, bytes: &[u8]) -> Result<(), IntakeError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    Err(IntakeError::NotAPdf {
        file_name: file_name.to_string(),
        magic: bytes.iter().take(4).copied().collect(),
    })
}

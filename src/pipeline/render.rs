//! PDF access: native text layer and page rasterisation.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. Callers run [`PdfBackend`] methods inside
//! `tokio::task::spawn_blocking` so the runtime's worker threads never stall
//! on a slow page.
//!
//! The trait exists so the extractor can be driven by a scripted backend in
//! tests; [`PdfiumBackend`] is the production implementation.

use crate::error::IntakeError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Blocking access to a PDF held in memory.
pub trait PdfBackend: Send + Sync {
    /// Text fragments of every page, in page order.
    ///
    /// The outer vector has one entry per page; a page without a text layer
    /// yields an empty vector.
    fn text_layer(&self, bytes: &[u8], password: Option<&str>)
        -> Result<Vec<Vec<String>>, IntakeError>;

    /// Rasterise one page (0-indexed), upscaled by `scale` and capped at
    /// `max_pixels` on either edge.
    fn render_page(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        page_index: usize,
        scale: f32,
        max_pixels: u32,
    ) -> Result<DynamicImage, IntakeError>;
}

/// [`PdfBackend`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    lib_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Bind the system pdfium, or the one in `lib_dir` when given.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    fn bind(&self) -> Result<Pdfium, IntakeError> {
        let bindings = match self.lib_dir {
            Some(ref dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| IntakeError::PdfiumBindingFailed(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

fn load_error(e: PdfiumError, password: Option<&str>) -> IntakeError {
    let detail = format!("{e:?}");
    let detail = if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            "wrong password".to_string()
        } else {
            "document is encrypted and requires a password".to_string()
        }
    } else {
        detail
    };
    IntakeError::Extraction {
        file_name: String::new(),
        detail,
    }
}

impl PdfBackend for PdfiumBackend {
    fn text_layer(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Vec<Vec<String>>, IntakeError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| load_error(e, password))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut out = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| IntakeError::Extraction {
                file_name: String::new(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
            let fragments: Vec<String> = text
                .all()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            debug!("Page {}: {} text fragments", idx + 1, fragments.len());
            out.push(fragments);
        }

        Ok(out)
    }

    fn render_page(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        page_index: usize,
        scale: f32,
        max_pixels: u32,
    ) -> Result<DynamicImage, IntakeError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| load_error(e, password))?;

        let render_failed = |detail: String| IntakeError::Ocr {
            page: Some(page_index + 1),
            detail: format!("rasterisation failed: {detail}"),
        };

        let page = document
            .pages()
            .get(page_index as u16)
            .map_err(|e| render_failed(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let image = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{e:?}")))?
            .as_image();

        debug!(
            "Rendered page {} → {}x{} px",
            page_index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

//! Pipeline stages for bill intake.
//!
//! Each submodule implements exactly one step. The orchestrator
//! ([`crate::session::IntakeSession`]) wires them together and owns the state
//! that flows between them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ analyze ──▶ (verify) ──▶ submit
//! (bytes)   (render/ocr) (backend)   (human)      (encode + backend)
//! ```
//!
//! 1. [`input`]   — read the file, check the PDF header, create the display copy
//! 2. [`extract`] — text layer via [`render`]; OCR fallback via [`ocr`],
//!    strictly one page at a time
//! 3. [`analyze`] — header hints and the field/value draft from the backend
//! 4. [`submit`]  — base64 the file via [`encode`] and save it with the record

pub mod analyze;
pub mod encode;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod render;
pub mod submit;

//! OCR Layout Worker Library
//!
//! Turns positioned OCR and PDF text fragments into reading-ordered text:
//! - `layout`: row clustering, label/value merging and form zoning
//! - `ocr`: engine sessions, preprocessing variants and multi-pass selection
//! - `pdf`: PDFium text layers and page rendering for OCR fallback
//! - `worker`: the long-lived JSON-lines request loop

pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod ocr;
pub mod pdf;
pub mod worker;

pub use config::WorkerConfig;
pub use document::{extract_document, DocumentResult, TextSource};
pub use error::{Error, ErrorKind, Result};
pub use ocr::{OcrPayload, Profile, Recognizer, RecognizerOptions};
pub use worker::{parse_request, Worker, WorkerRequest, WorkerResponse};

//! Error types for the OCR layout worker

use serde::Serialize;
use thiserror::Error;

/// Result type alias for the OCR layout worker
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category reported to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input (missing file, empty path). Never retried.
    Input,
    /// OCR engine construction or invocation failure
    Engine,
    /// A preprocessing step failed
    Preprocess,
    /// Malformed request on the worker channel
    Protocol,
    /// Anything else (I/O, serialization, PDFium)
    Internal,
}

/// Error types for the OCR layout worker
#[derive(Error, Debug)]
pub enum Error {
    /// No input path was provided
    #[error("No image path provided")]
    EmptyPath,

    /// Image file not found
    #[error("Image file not found: {path}")]
    ImageNotFound { path: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Neither the primary nor the fallback engine could be constructed
    #[error("OCR engine not available: {reason}")]
    EngineUnavailable { reason: String },

    /// A single engine invocation failed
    #[error("OCR engine failed: {reason}")]
    EngineFailed { reason: String },

    /// Invocation failed, and so did the rebuilt session
    #[error("{}", attempts.join("; "))]
    RetryExhausted { attempts: Vec<String> },

    /// A variant could not be rendered or saved
    #[error("Preprocessing failed for variant {variant}: {reason}")]
    Preprocess { variant: String, reason: String },

    /// Malformed worker request
    #[error("Invalid request: {reason}")]
    Protocol { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Category used by callers to tell input errors from engine errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyPath
            | Error::ImageNotFound { .. }
            | Error::PdfNotFound { .. }
            | Error::InvalidPdf { .. } => ErrorKind::Input,
            Error::EngineUnavailable { .. }
            | Error::EngineFailed { .. }
            | Error::RetryExhausted { .. } => ErrorKind::Engine,
            Error::Preprocess { .. } | Error::Image(_) => ErrorKind::Preprocess,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Pdfium { .. } | Error::Io(_) | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request could ever succeed.
    pub fn is_input_error(&self) -> bool {
        self.kind() == ErrorKind::Input
    }

    /// Render the error and its source chain, one cause per line.
    pub fn trace(&self) -> String {
        let mut out = format!("{}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

//! OCR orchestration
//!
//! Engine construction and sessions, preprocessing variants, pass scoring
//! and the recognition cycle that ties them together.

mod engine;
#[cfg(feature = "ocrs")]
mod ocrs_backend;
mod pipeline;
mod process;
mod profile;
mod scoring;
mod session;
mod types;
mod variants;

pub use engine::{
    build_backend, BackendFactory, BuildStage, EngineOutcome, OcrBackend, OutcomeTag,
    UnavailableFactory,
};
#[cfg(feature = "ocrs")]
pub use ocrs_backend::{OcrsBackend, OcrsBackendFactory};
pub use pipeline::{validate_image_path, OcrPayload, Recognizer, RecognizerOptions};
pub use process::{EngineCommand, ProcessBackend, ProcessBackendFactory};
pub use profile::{Profile, ProfileParams};
pub use scoring::score_fragments;
pub use session::{Session, SessionRegistry};
pub use types::{Backend, EngineResult, ScoredResult, VariantReport};
pub use variants::{
    build_variants, Variant, ENHANCE_2X, ENHANCE_2X_ROT180, GRAY_2X, ORIGINAL_VARIANT,
};

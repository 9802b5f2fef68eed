//! In-process OCR backend on the pure-Rust `ocrs` engine

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info};

use super::engine::{BackendFactory, BuildStage, OcrBackend};
use super::profile::{Profile, ProfileParams};
use crate::error::{Error, Result};
use crate::layout::TextFragment;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

fn engine_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::EngineFailed {
        reason: format!("{context}: {err}"),
    }
}

/// One loaded `ocrs` engine plus the parameters it applies
pub struct OcrsBackend {
    engine: Arc<OcrEngine>,
    params: ProfileParams,
}

impl OcrsBackend {
    fn load(model_dir: &Path) -> Result<OcrEngine> {
        let detection_path = model_dir.join(DETECTION_MODEL_FILENAME);
        let recognition_path = model_dir.join(RECOGNITION_MODEL_FILENAME);
        for path in [&detection_path, &recognition_path] {
            if !path.exists() {
                return Err(Error::EngineUnavailable {
                    reason: format!("model not found at {}", path.display()),
                });
            }
        }

        info!(dir = %model_dir.display(), "Loading ocrs models");
        let detection_model = Model::load_file(&detection_path)
            .map_err(|e| engine_error("failed to load detection model", e))?;
        let recognition_model = Model::load_file(&recognition_path)
            .map_err(|e| engine_error("failed to load recognition model", e))?;

        OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| engine_error("failed to initialise ocrs", e))
    }
}

impl OcrBackend for OcrsBackend {
    fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>> {
        let mut img = image::open(image)?;
        let (orig_w, orig_h) = (img.width(), img.height());

        // Downscale oversized input, then map boxes back
        let mut scale = 1.0f64;
        if let Some(max_side) = self.params.max_side_len {
            let longest = orig_w.max(orig_h);
            if max_side > 0 && longest > max_side {
                scale = longest as f64 / max_side as f64;
                img = img.resize(max_side, max_side, FilterType::Lanczos3);
            }
        }

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|e| engine_error("failed to create image source", e))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| engine_error("preprocessing failed", e))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|e| engine_error("word detection failed", e))?;
        let line_rects = self.engine.find_text_lines(&input, &words);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| engine_error("line recognition failed", e))?;

        let min_height = self.params.min_height.map(f64::from).unwrap_or(0.0);
        let mut fragments = Vec::new();
        for line in lines.iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let rect = line.bounding_rect();
            let left = rect.left() as f64 * scale;
            let top = rect.top() as f64 * scale;
            let right = rect.right() as f64 * scale;
            let bottom = rect.bottom() as f64 * scale;
            if bottom - top < min_height {
                continue;
            }
            fragments.push(TextFragment::from_rect(text, None, left, top, right, bottom));
        }

        debug!(lines = fragments.len(), width = orig_w, height = orig_h, "ocrs pass complete");
        Ok(fragments)
    }
}

/// Loads models once and hands out backends sharing them
pub struct OcrsBackendFactory {
    model_dir: PathBuf,
    engine: std::sync::Mutex<Option<Arc<OcrEngine>>>,
}

impl OcrsBackendFactory {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            engine: std::sync::Mutex::new(None),
        }
    }

    fn shared_engine(&self) -> Result<Arc<OcrEngine>> {
        let mut slot = self.engine.lock().map_err(|_| Error::EngineUnavailable {
            reason: "ocrs engine lock poisoned".to_string(),
        })?;
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }
        let engine = Arc::new(OcrsBackend::load(&self.model_dir)?);
        *slot = Some(engine.clone());
        Ok(engine)
    }
}

impl BackendFactory for OcrsBackendFactory {
    fn build(
        &self,
        profile: Profile,
        params: &ProfileParams,
        stage: BuildStage,
    ) -> Result<Box<dyn OcrBackend>> {
        debug!(profile = %profile, stage = ?stage, "Building ocrs backend");
        Ok(Box::new(OcrsBackend {
            engine: self.shared_engine()?,
            params: *params,
        }))
    }

    fn engine_id(&self) -> String {
        "ocrs".to_string()
    }

    fn describe(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("model_dir".to_string(), self.model_dir.display().to_string());
        out
    }
}

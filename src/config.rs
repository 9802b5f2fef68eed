//! Worker configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::error::Result;
use crate::layout::LabelVocabulary;
use crate::ocr::{
    BackendFactory, EngineCommand, ProcessBackendFactory, Profile, ProfileParams, Recognizer,
    RecognizerOptions, SessionRegistry,
};
use crate::pdf::sanitize_dpi;

/// Directory name models live under
pub const MODEL_DIR_NAME: &str = "ocr-models";

/// Runtime configuration shared by every subcommand
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Engine process to spawn; `None` selects the built-in backend when compiled in
    pub engine_cmd: Option<String>,
    pub engine_args: Vec<String>,
    pub engine_name: String,
    pub model_dir: Option<PathBuf>,
    /// Pass engine stderr through
    pub engine_debug: bool,
    /// Fixed multipass level; `None` uses the profile default
    pub multipass: Option<u8>,
    pub rotate180: bool,
    pub warmup: bool,
    pub pdf_dpi: u32,
    pub cache_dir: Option<PathBuf>,
    /// 0 = never expire
    pub cache_ttl_hours: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            engine_cmd: None,
            engine_args: Vec::new(),
            engine_name: "ocr-engine".to_string(),
            model_dir: None,
            engine_debug: false,
            multipass: None,
            rotate180: false,
            warmup: true,
            pdf_dpi: crate::pdf::DEFAULT_DPI,
            cache_dir: None,
            cache_ttl_hours: 0,
        }
    }
}

/// Normalize a model directory: append `ocr-models` unless already named so,
/// resolve relative paths against the current directory, create it.
pub fn resolve_model_dir(dir: &Path) -> Result<PathBuf> {
    let mut base = dir.to_path_buf();
    if base.file_name().map_or(true, |n| n != MODEL_DIR_NAME) {
        base.push(MODEL_DIR_NAME);
    }
    if base.is_relative() {
        base = std::env::current_dir()?.join(base);
    }
    std::fs::create_dir_all(&base)?;
    Ok(base)
}

impl WorkerConfig {
    pub fn pdf_dpi(&self) -> u32 {
        sanitize_dpi(self.pdf_dpi)
    }

    /// Resolved model directory, if one is configured and usable.
    pub fn model_dir(&self) -> Option<PathBuf> {
        let dir = self.model_dir.as_ref()?;
        match resolve_model_dir(dir) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Model directory unusable");
                None
            }
        }
    }

    /// Engine factory for this configuration.
    ///
    /// Never fails: a missing engine yields a factory whose builds fail, so
    /// the worker keeps answering with structured errors.
    pub fn backend_factory(&self) -> Arc<dyn BackendFactory> {
        let model_dir = self.model_dir();
        if let Some(program) = &self.engine_cmd {
            info!(program = %program, "Using engine process");
            return Arc::new(ProcessBackendFactory::new(EngineCommand {
                program: program.clone(),
                args: self.engine_args.clone(),
                name: self.engine_name.clone(),
                model_dir,
                inherit_stderr: self.engine_debug,
            }));
        }

        #[cfg(feature = "ocrs")]
        {
            let dir = model_dir.unwrap_or_else(|| PathBuf::from(MODEL_DIR_NAME));
            info!(dir = %dir.display(), "Using built-in ocrs engine");
            return Arc::new(crate::ocr::OcrsBackendFactory::new(dir));
        }

        #[cfg(not(feature = "ocrs"))]
        {
            let _ = model_dir;
            Arc::new(crate::ocr::UnavailableFactory {
                reason: "no OCR engine configured (set OCR_ENGINE_CMD)".to_string(),
            })
        }
    }

    pub fn recognizer_options(&self) -> RecognizerOptions {
        let mut params = std::collections::BTreeMap::new();
        if let Some(dir) = self.model_dir() {
            params.insert("model_dir".to_string(), dir.display().to_string());
        }
        RecognizerOptions {
            multipass: self.multipass,
            rotate180: self.rotate180,
            labels: LabelVocabulary::default(),
            params,
            scratch_root: None,
        }
    }

    /// Recognizer with a fresh session registry and optional parameter overrides.
    pub fn recognizer(&self, overrides: Option<(Profile, ProfileParams)>) -> Recognizer {
        self.recognizer_with_factory(self.backend_factory(), overrides)
    }

    pub fn recognizer_with_factory(
        &self,
        factory: Arc<dyn BackendFactory>,
        overrides: Option<(Profile, ProfileParams)>,
    ) -> Recognizer {
        let mut registry = SessionRegistry::new(factory);
        if let Some((profile, params)) = overrides {
            registry = registry.with_overrides(profile, params);
        }
        Recognizer::new(registry, self.recognizer_options())
    }

    /// Result cache, when a cache directory is configured.
    pub fn result_cache(&self) -> Option<ResultCache> {
        let dir = self.cache_dir.as_ref()?;
        match ResultCache::open(dir, self.cache_ttl_hours) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Result cache disabled");
                None
            }
        }
    }
}

//! Command-line surface
//!
//! Every option can also come from the environment, so the worker can be
//! configured by whatever process spawns it.

use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cache::{file_sha256, ResultCache};
use crate::config::WorkerConfig;
use crate::document::extract_document;
use crate::error::{Error, Result};
use crate::ocr::{validate_image_path, Profile, ProfileParams};
use crate::pdf::{extract_pdf_text, LayoutMode, EXTRACTOR};

#[derive(Debug, Parser)]
#[command(name = "ocr-layout-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OCR worker with reading-order reconstruction and multi-pass selection", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Defaults to `worker`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Engine program speaking the JSON-lines engine protocol
    #[arg(long = "engine-cmd", env = "OCR_ENGINE_CMD")]
    pub engine_cmd: Option<String>,

    /// Extra arguments for the engine program, whitespace separated
    #[arg(long = "engine-args", env = "OCR_ENGINE_ARGS", allow_hyphen_values = true)]
    pub engine_args: Option<String>,

    /// Engine name reported in responses
    #[arg(long = "engine-name", env = "OCR_ENGINE_NAME", default_value = "ocr-engine")]
    pub engine_name: String,

    #[arg(long = "model-dir", env = "OCR_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Pass the engine's stderr through
    #[arg(long = "engine-debug", env = "OCR_WORKER_DEBUG")]
    pub engine_debug: bool,

    /// Preprocessing passes: 0 = original only, 1 = +enhanced, 2 = +grayscale
    #[arg(long, env = "OCR_MULTIPASS", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub multipass: Option<u8>,

    /// Also try a 180° rotated pass for every profile
    #[arg(long, env = "OCR_ROTATE180")]
    pub rotate180: bool,

    /// Pre-build engine sessions before serving
    #[arg(
        long,
        env = "OCR_WORKER_WARMUP",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value_t = true
    )]
    pub warmup: bool,

    /// Render DPI for the PDF OCR fallback
    #[arg(long = "pdf-dpi", env = "OCR_PDF_DPI", default_value_t = crate::pdf::DEFAULT_DPI)]
    pub pdf_dpi: u32,

    /// Enables the single-shot result cache
    #[arg(long = "cache-dir", env = "OCR_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// 0 = never expire
    #[arg(long = "cache-ttl-hours", env = "OCR_CACHE_TTL_HOURS", default_value_t = 0)]
    pub cache_ttl_hours: u64,
}

impl ConfigArgs {
    pub fn into_config(self) -> WorkerConfig {
        WorkerConfig {
            engine_cmd: self.engine_cmd.filter(|c| !c.trim().is_empty()),
            engine_args: self
                .engine_args
                .map(|a| a.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            engine_name: self.engine_name,
            model_dir: self.model_dir,
            engine_debug: self.engine_debug,
            multipass: self.multipass,
            rotate180: self.rotate180,
            warmup: self.warmup,
            pdf_dpi: self.pdf_dpi,
            cache_dir: self.cache_dir,
            cache_ttl_hours: self.cache_ttl_hours,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve JSON-line requests on stdin/stdout until end of input
    Worker,

    /// Recognize one image and print the result
    Ocr(OcrArgs),

    /// Extract a PDF's text layer
    PdfText(PdfTextArgs),

    /// PDF text layer when usable, otherwise OCR; images are OCR'd directly
    Document {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct OcrArgs {
    pub image: String,

    #[arg(long, default_value = "default")]
    pub profile: String,

    #[arg(long = "max-side-len")]
    pub max_side_len: Option<u32>,

    #[arg(long = "min-height")]
    pub min_height: Option<u32>,

    #[arg(long = "text-score")]
    pub text_score: Option<f64>,

    /// Include per-variant scores
    #[arg(long)]
    pub debug: bool,
}

impl OcrArgs {
    pub fn profile(&self) -> Profile {
        Profile::parse_lenient(&self.profile)
    }

    pub fn overrides(&self) -> ProfileParams {
        ProfileParams {
            max_side_len: self.max_side_len,
            min_height: self.min_height,
            text_score: self.text_score,
        }
    }

    /// Arguments that change the output, for cache keys.
    fn cache_args(&self, config: &WorkerConfig) -> Vec<String> {
        let mut args = vec![format!("profile={}", self.profile())];
        if let Some(v) = self.max_side_len {
            args.push(format!("max_side_len={v}"));
        }
        if let Some(v) = self.min_height {
            args.push(format!("min_height={v}"));
        }
        if let Some(v) = self.text_score {
            args.push(format!("text_score={v}"));
        }
        if let Some(v) = config.multipass {
            args.push(format!("multipass={v}"));
        }
        if config.rotate180 {
            args.push("rotate180".to_string());
        }
        if self.debug {
            args.push("debug".to_string());
        }
        args
    }
}

#[derive(Debug, Clone, Args)]
pub struct PdfTextArgs {
    pub pdf: PathBuf,

    #[arg(long, default_value = "zones")]
    pub layout: LayoutMode,

    /// Include structured zoned pages
    #[arg(long = "pages-json")]
    pub pages_json: bool,
}

/// Failure object printed by single-shot commands
pub fn failure_value(err: &Error) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "error_kind": err.kind(),
    })
}

fn with_success(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => other,
    }
}

fn cached<F>(cache: Option<&ResultCache>, kind: &str, engine: &str, file: &Path, args: &[String], compute: F) -> Result<Value>
where
    F: FnOnce() -> Result<Value>,
{
    let key = match cache {
        Some(_) => Some(ResultCache::key(kind, engine, &file_sha256(file)?, args)),
        None => None,
    };
    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        if let Some(hit) = cache.get(key) {
            debug!(kind, key, "Cache hit");
            return Ok(hit);
        }
    }

    let value = compute()?;
    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        cache.put(key, &value)?;
    }
    Ok(value)
}

/// One stateless recognition cycle.
pub fn run_ocr(config: &WorkerConfig, args: &OcrArgs) -> Result<Value> {
    let path = validate_image_path(&args.image)?;
    let profile = args.profile();
    let overrides = args.overrides();
    let factory = config.backend_factory();
    let cache = config.result_cache();

    cached(
        cache.as_ref(),
        "ocr",
        &factory.engine_id(),
        path,
        &args.cache_args(config),
        || {
            let overrides = (!overrides.is_empty()).then_some((profile, overrides));
            let mut recognizer = config.recognizer_with_factory(factory.clone(), overrides);
            let payload = recognizer.recognize(&args.image, profile, args.debug)?;
            Ok(with_success(serde_json::to_value(payload)?))
        },
    )
}

pub fn run_pdf_text(config: &WorkerConfig, args: &PdfTextArgs) -> Result<Value> {
    let cache = config.result_cache();
    let cache_args = vec![format!("layout={}", args.layout), format!("pages_json={}", args.pages_json)];
    // A missing file must fail as such, not as a hashing I/O error
    if !args.pdf.is_file() {
        return Err(Error::PdfNotFound {
            path: args.pdf.display().to_string(),
        });
    }
    cached(cache.as_ref(), "pdf_text", EXTRACTOR, &args.pdf, &cache_args, || {
        Ok(serde_json::to_value(extract_pdf_text(&args.pdf, args.layout, args.pages_json)?)?)
    })
}

pub fn run_document(config: &WorkerConfig, path: &Path) -> Result<Value> {
    let mut recognizer = config.recognizer(None);
    let result = extract_document(path, config.pdf_dpi(), &mut recognizer)?;
    info!(path = %path.display(), source = ?result.source, pages = result.page_count, "Document extracted");
    Ok(serde_json::to_value(result)?)
}

/// Run a single-shot command. `Worker` is not single-shot and is rejected.
pub fn run_one_shot(config: &WorkerConfig, command: &Command) -> Result<Value> {
    match command {
        Command::Ocr(args) => run_ocr(config, args),
        Command::PdfText(args) => run_pdf_text(config, args),
        Command::Document { path } => run_document(config, path),
        Command::Worker => Err(Error::Protocol {
            reason: "worker mode is not a single-shot command".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ocr-layout-worker"]).unwrap();
        assert!(cli.command.is_none());
        let config = cli.config.into_config();
        assert!(config.warmup);
        assert_eq!(config.pdf_dpi, 220);
        assert_eq!(config.engine_name, "ocr-engine");
        assert!(config.engine_args.is_empty());
    }

    #[test]
    fn test_ocr_command() {
        let cli = Cli::try_parse_from([
            "ocr-layout-worker",
            "--multipass",
            "2",
            "--engine-args",
            "--lang ch",
            "ocr",
            "/tmp/a.png",
            "--profile",
            "PDF",
            "--min-height",
            "12",
        ])
        .unwrap();
        let config = cli.config.into_config();
        assert_eq!(config.multipass, Some(2));
        assert_eq!(config.engine_args, vec!["--lang", "ch"]);
        let Some(Command::Ocr(args)) = cli.command else {
            panic!("expected ocr command");
        };
        assert_eq!(args.profile(), Profile::Pdf);
        assert_eq!(args.overrides().min_height, Some(12));
        assert_eq!(args.overrides().max_side_len, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["ocr-layout-worker", "--multipass", "3"]).is_err());
        assert!(Cli::try_parse_from(["ocr-layout-worker", "pdf-text", "a.pdf", "--layout", "columns"]).is_err());
        let cli = Cli::try_parse_from(["ocr-layout-worker", "--warmup", "0"]).unwrap();
        assert!(!cli.config.warmup);
    }

    #[test]
    fn test_ocr_missing_image_fails_as_input() {
        let args = OcrArgs {
            image: "/nonexistent/img.png".to_string(),
            profile: "default".to_string(),
            max_side_len: None,
            min_height: None,
            text_score: None,
            debug: false,
        };
        let err = run_ocr(&WorkerConfig::default(), &args).unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(failure_value(&err)["error_kind"], "input");
    }

    #[test]
    fn test_cached_reuses_value() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.bin");
        std::fs::write(&file, b"data").unwrap();
        let cache = ResultCache::open(dir.path(), 0).unwrap();
        let first = cached(Some(&cache), "ocr", "e", &file, &[], || Ok(json!({"text": "a"}))).unwrap();
        let second = cached(Some(&cache), "ocr", "e", &file, &[], || Ok(json!({"text": "b"}))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_worker_is_not_one_shot() {
        assert!(run_one_shot(&WorkerConfig::default(), &Command::Worker).is_err());
    }
}

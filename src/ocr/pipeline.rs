//! One recognition cycle: original pass, variant passes, best-result selection

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::profile::Profile;
use super::scoring::score_fragments;
use super::session::SessionRegistry;
use super::types::{Backend, EngineResult, ScoredResult, VariantReport};
use super::variants::{build_variants, ORIGINAL_VARIANT};
use crate::error::{Error, Result};
use crate::layout::{
    join_lines, merge_labels_with_values, reading_order, LabelVocabulary, MergeLimits,
    RowTolerance, TextFragment,
};

const VARIANT_DIR_PREFIX: &str = "ocr-variants-";

/// Per-worker knobs for [`Recognizer`]
#[derive(Debug, Clone, Default)]
pub struct RecognizerOptions {
    /// Fixed multipass level; `None` uses the profile default
    pub multipass: Option<u8>,
    /// Force rotation correction for every profile
    pub rotate180: bool,
    pub labels: LabelVocabulary,
    /// Extra entries reported under `params`
    pub params: BTreeMap<String, String>,
    /// Parent of per-request scratch directories; the system temp dir when unset
    pub scratch_root: Option<PathBuf>,
}

impl RecognizerOptions {
    pub fn multipass_for(&self, profile: Profile) -> u8 {
        self.multipass.unwrap_or_else(|| profile.default_multipass())
    }

    pub fn rotate180_for(&self, profile: Profile) -> bool {
        self.rotate180 || profile == Profile::Pdf
    }

    /// Fresh uniquely-named directory, removed when the handle drops.
    pub fn scratch_dir(&self, prefix: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        Ok(match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        })
    }
}

/// Successful recognition response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrPayload {
    pub text: String,
    pub lines: Vec<TextFragment>,
    pub line_count: usize,
    pub engine: String,
    pub profile: Profile,
    pub variant: String,
    pub backend: Backend,
    pub backend_errors: Vec<String>,
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantReport>>,
}

/// Owns the session registry and runs full recognition cycles
pub struct Recognizer {
    registry: SessionRegistry,
    options: RecognizerOptions,
}

impl Recognizer {
    pub fn new(registry: SessionRegistry, options: RecognizerOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &RecognizerOptions {
        &self.options
    }

    /// Reorder and, for label-merging profiles, splice a raw engine result.
    pub fn reconstruct(&self, result: EngineResult, profile: Profile) -> ScoredResult {
        let mut lines = reading_order(result.fragments, RowTolerance::OCR_LINES);
        if profile.merges_labels() {
            lines = merge_labels_with_values(lines, &self.options.labels, MergeLimits::default());
        }
        let score = score_fragments(&lines);
        ScoredResult {
            text: join_lines(&lines),
            lines,
            backend: result.backend,
            errors: result.errors,
            score,
        }
    }

    /// Run one recognition cycle on `image_path`.
    pub fn recognize(&mut self, image_path: &str, profile: Profile, debug: bool) -> Result<OcrPayload> {
        let path = validate_image_path(image_path)?;

        let original = self.registry.run(profile, path)?;
        let mut best = self.reconstruct(original, profile);
        let mut best_variant = ORIGINAL_VARIANT.to_string();
        let mut reports = vec![best.report(ORIGINAL_VARIANT)];

        let multipass = self.options.multipass_for(profile);
        if multipass > 0 {
            let source = match image::open(path) {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not decode image for variants");
                    None
                }
            };
            let variants = build_variants(
                source.as_ref(),
                profile,
                multipass,
                self.options.rotate180_for(profile),
            );

            if !variants.is_empty() {
                // Removed on drop, on every exit path
                let dir = self.options.scratch_dir(VARIANT_DIR_PREFIX)?;
                for variant in &variants {
                    let variant_path = match variant.save_png(dir.path()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(variant = variant.name, error = %e, "Skipping variant");
                            reports.push(VariantReport::skipped(variant.name, e.to_string()));
                            continue;
                        }
                    };
                    // Engine failures here already went through one rebuild
                    let result = self.registry.run(profile, &variant_path)?;
                    let scored = self.reconstruct(result, profile);
                    debug!(variant = variant.name, score = scored.score, "Variant scored");
                    reports.push(scored.report(variant.name));
                    if scored.beats(&best) {
                        best = scored;
                        best_variant = variant.name.to_string();
                    }
                }
            }
        }

        info!(
            profile = %profile,
            variant = %best_variant,
            lines = best.line_count(),
            score = best.score,
            "Recognition complete"
        );

        let mut params = self.registry.factory().describe();
        params.extend(self.registry.params_for(profile).summary());
        params.extend(self.options.params.clone());

        Ok(OcrPayload {
            line_count: best.line_count(),
            text: best.text,
            lines: best.lines,
            engine: self.registry.factory().engine_id(),
            profile,
            variant: best_variant,
            backend: best.backend,
            backend_errors: best.errors,
            params,
            variants: debug.then_some(reports),
        })
    }
}

/// Reject empty and missing paths before any engine work.
pub fn validate_image_path(image_path: &str) -> Result<&Path> {
    if image_path.trim().is_empty() {
        return Err(Error::EmptyPath);
    }
    let path = Path::new(image_path);
    if !path.is_file() {
        return Err(Error::ImageNotFound {
            path: image_path.to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::{BackendFactory, BuildStage, OcrBackend};
    use crate::ocr::profile::ProfileParams;
    use image::{DynamicImage, RgbImage};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Returns a canned result per input file name
    struct ByName {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl OcrBackend for ByName {
        fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>> {
            let name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.seen.lock().unwrap().push(name.clone());
            let frag = |t: &str, c, top: f64| TextFragment::from_rect(t, Some(c), 0.0, top, 60.0, top + 20.0);
            Ok(match name.as_str() {
                "gray2x.png" => vec![frag("发票号码", 0.95, 0.0), frag("04512345", 0.95, 30.0)],
                "enhance2x.png" => vec![frag("发票", 0.5, 0.0)],
                "enhance2x_rot180.png" => Vec::new(),
                _ => vec![frag("发票", 0.6, 0.0)],
            })
        }
    }

    struct ByNameFactory {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl BackendFactory for ByNameFactory {
        fn build(&self, _: Profile, _: &ProfileParams, _: BuildStage) -> Result<Box<dyn OcrBackend>> {
            Ok(Box::new(ByName {
                seen: self.seen.clone(),
            }))
        }

        fn engine_id(&self) -> String {
            "by-name".to_string()
        }
    }

    fn recognizer(multipass: Option<u8>) -> (Recognizer, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = SessionRegistry::new(Arc::new(ByNameFactory { seen: seen.clone() }));
        let options = RecognizerOptions {
            multipass,
            ..Default::default()
        };
        (Recognizer::new(registry, options), seen)
    }

    fn write_image(dir: &Path) -> String {
        let path = dir.join("page.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, image::Rgb([200, 200, 200])))
            .save(&path)
            .unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_input_errors() {
        let (mut r, seen) = recognizer(None);
        assert!(matches!(r.recognize("", Profile::Default, false), Err(Error::EmptyPath)));
        assert!(matches!(
            r.recognize("/no/such/image.png", Profile::Default, false),
            Err(Error::ImageNotFound { .. })
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_best_variant_wins() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path());
        let (mut r, seen) = recognizer(Some(2));
        let payload = r.recognize(&image, Profile::Pdf, true).unwrap();

        assert_eq!(payload.variant, "gray2x");
        assert_eq!(payload.text, "发票号码\n04512345");
        assert_eq!(payload.line_count, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["page.png", "enhance2x.png", "gray2x.png", "enhance2x_rot180.png"]
        );
        let names: Vec<String> = payload.variants.unwrap().into_iter().map(|v| v.variant).collect();
        assert_eq!(names, vec!["original", "enhance2x", "gray2x", "enhance2x_rot180"]);
        assert_eq!(payload.params.get("max_side_len").map(String::as_str), Some("4096"));
    }

    #[test]
    fn test_original_wins_ties_and_default_has_no_variants() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path());
        let (mut r, seen) = recognizer(Some(2));
        let payload = r.recognize(&image, Profile::Default, false).unwrap();
        assert_eq!(payload.variant, "original");
        assert!(payload.variants.is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_default_profile_merges_labels() {
        let r = recognizer(None).0;
        let result = EngineResult {
            fragments: vec![
                TextFragment::from_rect("12345", Some(0.9), 50.0, 10.0, 90.0, 20.0),
                TextFragment::from_rect("发票代码", Some(0.9), 0.0, 10.0, 40.0, 20.0),
            ],
            backend: Backend::Primary,
            errors: Vec::new(),
        };
        let merged = r.reconstruct(result.clone(), Profile::Default);
        assert_eq!(merged.text, "发票代码：12345");
        let pdf = r.reconstruct(result, Profile::Pdf);
        assert_eq!(pdf.text, "发票代码\n12345");
    }

    /// Fails every run on one file name, rebuilds included
    struct FailsOn {
        name: &'static str,
    }

    impl OcrBackend for FailsOn {
        fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>> {
            if image.file_name().map_or(false, |n| n == self.name) {
                return Err(Error::EngineFailed {
                    reason: format!("cannot read {}", self.name),
                });
            }
            Ok(vec![TextFragment::from_rect("发票", Some(0.6), 0.0, 0.0, 60.0, 20.0)])
        }
    }

    struct FailsOnFactory {
        name: &'static str,
        builds: Arc<Mutex<usize>>,
    }

    impl BackendFactory for FailsOnFactory {
        fn build(&self, _: Profile, _: &ProfileParams, _: BuildStage) -> Result<Box<dyn OcrBackend>> {
            *self.builds.lock().unwrap() += 1;
            Ok(Box::new(FailsOn { name: self.name }))
        }

        fn engine_id(&self) -> String {
            "fails-on".to_string()
        }
    }

    fn failing_recognizer(name: &'static str, scratch: &Path) -> (Recognizer, Arc<Mutex<usize>>) {
        let builds = Arc::new(Mutex::new(0));
        let registry = SessionRegistry::new(Arc::new(FailsOnFactory {
            name,
            builds: builds.clone(),
        }));
        let options = RecognizerOptions {
            multipass: Some(2),
            scratch_root: Some(scratch.to_path_buf()),
            ..Default::default()
        };
        (Recognizer::new(registry, options), builds)
    }

    fn leftover_scratch_dirs(root: &Path) -> Vec<String> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(VARIANT_DIR_PREFIX))
            .collect()
    }

    #[test]
    fn test_variant_engine_failure_fails_request() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let image = write_image(dir.path());
        let (mut r, builds) = failing_recognizer("enhance2x.png", scratch.path());

        let err = r.recognize(&image, Profile::Pdf, true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Engine);
        let Error::RetryExhausted { attempts } = &err else {
            panic!("expected retry exhaustion, got {err:?}");
        };
        assert!(attempts[0].starts_with("run_failed"));
        assert!(attempts[1].starts_with("recreate_failed"));
        // initial session plus the one rebuild
        assert_eq!(*builds.lock().unwrap(), 2);
    }

    #[test]
    fn test_scratch_dir_removed_on_every_exit() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let image = write_image(dir.path());

        let (mut ok, _) = failing_recognizer("none.png", scratch.path());
        let payload = ok.recognize(&image, Profile::Pdf, true).unwrap();
        assert_eq!(payload.variants.map(|v| v.len()), Some(4));
        assert!(leftover_scratch_dirs(scratch.path()).is_empty());

        let (mut failing, _) = failing_recognizer("gray2x.png", scratch.path());
        assert!(failing.recognize(&image, Profile::Pdf, false).is_err());
        assert!(leftover_scratch_dirs(scratch.path()).is_empty());
    }

    #[test]
    fn test_options_defaults() {
        let options = RecognizerOptions::default();
        assert_eq!(options.multipass_for(Profile::Pdf), 1);
        assert_eq!(options.multipass_for(Profile::Default), 0);
        assert!(options.rotate180_for(Profile::Pdf));
        assert!(!options.rotate180_for(Profile::Default));
    }
}

//! OCR engine seam and the primary -> fallback construction step

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use super::profile::{Profile, ProfileParams};
use super::types::Backend;
use crate::error::{Error, Result};
use crate::layout::TextFragment;

/// A constructed OCR engine instance
pub trait OcrBackend: Send {
    /// Recognize text in the image at `image`.
    fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>>;
}

/// Which construction attempt is being made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// With the profile's parameters
    Primary,
    /// With engine defaults
    Fallback,
}

/// Builds engines. Shared by every session of a worker.
pub trait BackendFactory: Send + Sync {
    fn build(
        &self,
        profile: Profile,
        params: &ProfileParams,
        stage: BuildStage,
    ) -> Result<Box<dyn OcrBackend>>;

    /// Identifier reported as `engine` in responses
    fn engine_id(&self) -> String;

    /// Static parameters reported under `params`
    fn describe(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Stand-in when no engine is configured; every build fails with `reason`.
#[derive(Debug, Clone)]
pub struct UnavailableFactory {
    pub reason: String,
}

impl BackendFactory for UnavailableFactory {
    fn build(
        &self,
        _profile: Profile,
        _params: &ProfileParams,
        _stage: BuildStage,
    ) -> Result<Box<dyn OcrBackend>> {
        Err(Error::EngineUnavailable {
            reason: self.reason.clone(),
        })
    }

    fn engine_id(&self) -> String {
        "unavailable".to_string()
    }
}

/// Tag of an [`EngineOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTag {
    Primary,
    Fallback,
    Fatal,
}

/// Result of [`build_backend`]
pub enum EngineOutcome {
    /// Built with the profile's parameters
    Primary { engine: Box<dyn OcrBackend> },
    /// Primary failed; built with defaults. `detail` holds the primary error.
    Fallback {
        engine: Box<dyn OcrBackend>,
        detail: String,
    },
    /// Nothing could be built
    Fatal { detail: Vec<String> },
}

impl std::fmt::Debug for EngineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOutcome")
            .field("outcome", &self.outcome())
            .field("detail", &self.detail())
            .finish()
    }
}

impl EngineOutcome {
    pub fn outcome(&self) -> OutcomeTag {
        match self {
            EngineOutcome::Primary { .. } => OutcomeTag::Primary,
            EngineOutcome::Fallback { .. } => OutcomeTag::Fallback,
            EngineOutcome::Fatal { .. } => OutcomeTag::Fatal,
        }
    }

    pub fn detail(&self) -> Vec<String> {
        match self {
            EngineOutcome::Primary { .. } => Vec::new(),
            EngineOutcome::Fallback { detail, .. } => vec![detail.clone()],
            EngineOutcome::Fatal { detail } => detail.clone(),
        }
    }

    /// Engine, its backend tag and construction notes; `Fatal` becomes an error.
    pub fn into_engine(self) -> Result<(Box<dyn OcrBackend>, Backend, Vec<String>)> {
        match self {
            EngineOutcome::Primary { engine } => Ok((engine, Backend::Primary, Vec::new())),
            EngineOutcome::Fallback { engine, detail } => {
                Ok((engine, Backend::Fallback, vec![detail]))
            }
            EngineOutcome::Fatal { detail } => Err(Error::EngineUnavailable {
                reason: detail.join("; "),
            }),
        }
    }
}

/// Build an engine for `profile`: profile parameters first, then engine
/// defaults. Profiles without parameters get a single attempt.
pub fn build_backend(
    factory: &dyn BackendFactory,
    profile: Profile,
    params: &ProfileParams,
) -> EngineOutcome {
    let primary_err = match factory.build(profile, params, BuildStage::Primary) {
        Ok(engine) => {
            info!(profile = %profile, "OCR engine ready");
            return EngineOutcome::Primary { engine };
        }
        Err(e) => e,
    };

    if params.is_empty() {
        warn!(profile = %profile, error = %primary_err, "OCR engine construction failed");
        return EngineOutcome::Fatal {
            detail: vec![format!("primary_failed: {primary_err}")],
        };
    }

    warn!(
        profile = %profile,
        error = %primary_err,
        "OCR engine rejected profile parameters, retrying with defaults"
    );
    match factory.build(profile, &ProfileParams::default(), BuildStage::Fallback) {
        Ok(engine) => EngineOutcome::Fallback {
            engine,
            detail: format!("primary_failed: {primary_err}"),
        },
        Err(fallback_err) => EngineOutcome::Fatal {
            detail: vec![
                format!("primary_failed: {primary_err}"),
                format!("fallback_failed: {fallback_err}"),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl OcrBackend for Echo {
        fn infer(&mut self, _image: &Path) -> Result<Vec<TextFragment>> {
            Ok(vec![TextFragment::new("ok", Some(1.0), None)])
        }
    }

    /// Fails the listed stages
    struct Picky {
        fail_primary: bool,
        fail_fallback: bool,
    }

    impl BackendFactory for Picky {
        fn build(
            &self,
            _profile: Profile,
            _params: &ProfileParams,
            stage: BuildStage,
        ) -> Result<Box<dyn OcrBackend>> {
            let fail = match stage {
                BuildStage::Primary => self.fail_primary,
                BuildStage::Fallback => self.fail_fallback,
            };
            if fail {
                Err(Error::EngineFailed {
                    reason: format!("{stage:?} refused"),
                })
            } else {
                Ok(Box::new(Echo))
            }
        }

        fn engine_id(&self) -> String {
            "picky".to_string()
        }
    }

    #[test]
    fn test_primary() {
        let f = Picky {
            fail_primary: false,
            fail_fallback: true,
        };
        let outcome = build_backend(&f, Profile::Pdf, &ProfileParams::for_profile(Profile::Pdf));
        assert_eq!(outcome.outcome(), OutcomeTag::Primary);
        assert!(outcome.detail().is_empty());
    }

    #[test]
    fn test_fallback_records_primary_error() {
        let f = Picky {
            fail_primary: true,
            fail_fallback: false,
        };
        let outcome = build_backend(&f, Profile::Pdf, &ProfileParams::for_profile(Profile::Pdf));
        assert_eq!(outcome.outcome(), OutcomeTag::Fallback);
        let (mut engine, backend, notes) = outcome.into_engine().unwrap();
        assert_eq!(backend, Backend::Fallback);
        assert_eq!(notes, vec!["primary_failed: OCR engine failed: Primary refused"]);
        assert_eq!(engine.infer(Path::new("x.png")).unwrap().len(), 1);
    }

    #[test]
    fn test_fatal_carries_both_errors() {
        let f = Picky {
            fail_primary: true,
            fail_fallback: true,
        };
        let outcome = build_backend(&f, Profile::Pdf, &ProfileParams::for_profile(Profile::Pdf));
        assert_eq!(outcome.outcome(), OutcomeTag::Fatal);
        assert_eq!(outcome.detail().len(), 2);
        let err = outcome.into_engine().err().unwrap();
        assert!(matches!(err, Error::EngineUnavailable { .. }));
    }

    #[test]
    fn test_no_fallback_without_params() {
        let f = Picky {
            fail_primary: true,
            fail_fallback: false,
        };
        let outcome = build_backend(&f, Profile::Default, &ProfileParams::default());
        assert_eq!(outcome.outcome(), OutcomeTag::Fatal);
        assert_eq!(outcome.detail().len(), 1);
    }
}

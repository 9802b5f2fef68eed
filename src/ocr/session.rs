//! Per-profile engine sessions with single rebuild on failure

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::engine::{build_backend, BackendFactory, OcrBackend};
use super::profile::{Profile, ProfileParams};
use super::types::{Backend, EngineResult};
use crate::error::{Error, Result};

/// A live engine for one profile
pub struct Session {
    engine: Box<dyn OcrBackend>,
    backend: Backend,
    /// Construction notes (fallback reasons), reported with every result
    notes: Vec<String>,
}

impl Session {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}

/// Owns one session per profile for the lifetime of a worker.
///
/// Sessions are created on first use and kept until a failed invocation
/// invalidates them.
pub struct SessionRegistry {
    factory: Arc<dyn BackendFactory>,
    overrides: HashMap<Profile, ProfileParams>,
    sessions: HashMap<Profile, Session>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            overrides: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Override individual engine parameters for one profile.
    pub fn with_overrides(mut self, profile: Profile, params: ProfileParams) -> Self {
        self.overrides.insert(profile, params);
        self
    }

    pub fn factory(&self) -> &Arc<dyn BackendFactory> {
        &self.factory
    }

    /// Effective engine parameters for `profile`.
    pub fn params_for(&self, profile: Profile) -> ProfileParams {
        let base = ProfileParams::for_profile(profile);
        match self.overrides.get(&profile) {
            Some(o) => base.with_overrides(o),
            None => base,
        }
    }

    pub fn is_live(&self, profile: Profile) -> bool {
        self.sessions.contains_key(&profile)
    }

    /// Session for `profile`, building it if absent.
    pub fn get_session(&mut self, profile: Profile) -> Result<&mut Session> {
        if !self.sessions.contains_key(&profile) {
            let params = self.params_for(profile);
            let (engine, backend, notes) =
                build_backend(self.factory.as_ref(), profile, &params).into_engine()?;
            self.sessions.insert(
                profile,
                Session {
                    engine,
                    backend,
                    notes,
                },
            );
        }
        self.sessions
            .get_mut(&profile)
            .ok_or_else(|| Error::EngineUnavailable {
                reason: format!("session for profile {profile} vanished"),
            })
    }

    /// Drop the session for `profile`, if any.
    pub fn invalidate(&mut self, profile: Profile) {
        if self.sessions.remove(&profile).is_some() {
            debug!(profile = %profile, "Session invalidated");
        }
    }

    fn infer_once(&mut self, profile: Profile, image: &Path) -> Result<EngineResult> {
        let session = self.get_session(profile)?;
        let fragments = session.engine.infer(image)?;
        Ok(EngineResult {
            fragments,
            backend: session.backend,
            errors: session.notes.clone(),
        })
    }

    /// Run the engine once; on failure rebuild the session and retry once.
    ///
    /// A recovered run reports the first failure as one `backend_errors`
    /// entry. If the retry fails too, both messages are surfaced.
    pub fn run(&mut self, profile: Profile, image: &Path) -> Result<EngineResult> {
        // Construction failures are not retried here
        self.get_session(profile)?;

        let first = match self.infer_once(profile, image) {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        warn!(profile = %profile, error = %first, "OCR run failed, recreating session");
        self.invalidate(profile);

        match self.infer_once(profile, image) {
            Ok(mut result) => {
                info!(profile = %profile, "Recreated session recovered");
                result
                    .errors
                    .push(format!("session_recreated after run_failed: {first}"));
                Ok(result)
            }
            Err(second) => {
                self.invalidate(profile);
                Err(Error::RetryExhausted {
                    attempts: vec![
                        format!("run_failed: {first}"),
                        format!("recreate_failed: {second}"),
                    ],
                })
            }
        }
    }

    /// Best-effort pre-build of every profile's session. Failures are logged
    /// and otherwise ignored.
    pub fn warm_up(&mut self) {
        for profile in Profile::ALL {
            match self.get_session(profile) {
                Ok(_) => debug!(profile = %profile, "Session warmed"),
                Err(e) => warn!(profile = %profile, error = %e, "Warmup failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextFragment;
    use crate::ocr::engine::BuildStage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine whose n-th global invocation fails when listed in `fail_calls`
    struct Scripted {
        calls: Arc<AtomicUsize>,
        fail_calls: Vec<usize>,
    }

    impl OcrBackend for Scripted {
        fn infer(&mut self, _image: &Path) -> Result<Vec<TextFragment>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls.contains(&n) {
                return Err(Error::EngineFailed {
                    reason: format!("call {n} crashed"),
                });
            }
            Ok(vec![TextFragment::new("金额", Some(0.9), None)])
        }
    }

    struct ScriptedFactory {
        calls: Arc<AtomicUsize>,
        builds: Arc<AtomicUsize>,
        fail_calls: Vec<usize>,
        fail_builds: bool,
    }

    impl ScriptedFactory {
        fn new(fail_calls: Vec<usize>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                builds: Arc::new(AtomicUsize::new(0)),
                fail_calls,
                fail_builds: false,
            }
        }
    }

    impl BackendFactory for ScriptedFactory {
        fn build(
            &self,
            _profile: Profile,
            _params: &ProfileParams,
            _stage: BuildStage,
        ) -> Result<Box<dyn OcrBackend>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail_builds {
                return Err(Error::EngineFailed {
                    reason: "no models".to_string(),
                });
            }
            Ok(Box::new(Scripted {
                calls: self.calls.clone(),
                fail_calls: self.fail_calls.clone(),
            }))
        }

        fn engine_id(&self) -> String {
            "scripted".to_string()
        }
    }

    #[test]
    fn test_session_is_cached() {
        let factory = Arc::new(ScriptedFactory::new(vec![]));
        let builds = factory.builds.clone();
        let mut registry = SessionRegistry::new(factory);
        registry.run(Profile::Default, Path::new("a.png")).unwrap();
        registry.run(Profile::Default, Path::new("b.png")).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(registry.is_live(Profile::Default));
        assert!(!registry.is_live(Profile::Pdf));
    }

    #[test]
    fn test_recovers_after_rebuild() {
        let factory = Arc::new(ScriptedFactory::new(vec![0]));
        let builds = factory.builds.clone();
        let mut registry = SessionRegistry::new(factory);
        let result = registry.run(Profile::Pdf, Path::new("a.png")).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("call 0 crashed"));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_failure_reports_both() {
        let factory = Arc::new(ScriptedFactory::new(vec![0, 1]));
        let mut registry = SessionRegistry::new(factory);
        let err = registry.run(Profile::Pdf, Path::new("a.png")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("run_failed: OCR engine failed: call 0 crashed"));
        assert!(msg.contains("; recreate_failed: OCR engine failed: call 1 crashed"));
        assert!(!registry.is_live(Profile::Pdf));
    }

    #[test]
    fn test_warm_up_swallows_failures() {
        let mut factory = ScriptedFactory::new(vec![]);
        factory.fail_builds = true;
        let mut registry = SessionRegistry::new(Arc::new(factory));
        registry.warm_up();
        assert!(!registry.is_live(Profile::Default));
        let err = registry.run(Profile::Default, Path::new("a.png")).unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable { .. }));
    }

    #[test]
    fn test_overrides_apply_per_profile() {
        let registry = SessionRegistry::new(Arc::new(ScriptedFactory::new(vec![]))).with_overrides(
            Profile::Pdf,
            ProfileParams {
                text_score: Some(0.5),
                ..Default::default()
            },
        );
        let p = registry.params_for(Profile::Pdf);
        assert_eq!(p.text_score, Some(0.5));
        assert_eq!(p.max_side_len, Some(4096));
        assert!(registry.params_for(Profile::Default).is_empty());
    }
}

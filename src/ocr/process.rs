//! Engine backend that drives a long-lived OCR child process over JSON lines
//!
//! Handshake: `{"params": {...}}` -> `{"ready": true}` or `{"error": "..."}`.
//! Requests: `{"image_path": "...", "params": {...}}` ->
//! `{"lines": [{"text", "confidence", "box"}]}` or `{"error": "..."}`.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::engine::{BackendFactory, BuildStage, OcrBackend};
use super::profile::{Profile, ProfileParams};
use crate::error::{Error, Result};
use crate::layout::{Point, TextFragment};

/// How to launch the engine process
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Reported as `engine` in responses
    pub name: String,
    /// Exported to the child as `OCR_MODEL_DIR`
    pub model_dir: Option<PathBuf>,
    /// Let the child write to our stderr
    pub inherit_stderr: bool,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<&'a str>,
    params: &'a ProfileParams,
}

#[derive(Debug, Default, Deserialize)]
struct WireResponse {
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    lines: Option<Vec<WireLine>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLine {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default, rename = "box")]
    bbox: Option<Value>,
}

impl WireLine {
    /// Validate one wire record into a fragment.
    fn into_fragment(self) -> TextFragment {
        let confidence = self
            .confidence
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0));
        let bbox = self.bbox.as_ref().and_then(parse_points);
        TextFragment::new(self.text.unwrap_or_default(), confidence, bbox)
    }
}

/// Keep only points with two finite coordinates; `None` when nothing is left.
fn parse_points(value: &Value) -> Option<Vec<Point>> {
    let points: Vec<Point> = value
        .as_array()?
        .iter()
        .filter_map(|p| {
            let coords = p.as_array()?;
            if coords.len() < 2 {
                return None;
            }
            let x = coords[0].as_f64()?;
            let y = coords[1].as_f64()?;
            (x.is_finite() && y.is_finite()).then_some([x, y])
        })
        .collect();
    (!points.is_empty()).then_some(points)
}

/// Owns the child; killed and reaped on drop.
struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// One running engine process
pub struct ProcessBackend {
    params: ProfileParams,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    // Dropped last so the pipes close before the kill
    _guard: ChildGuard,
}

impl ProcessBackend {
    /// Spawn the engine and complete the parameter handshake.
    pub fn spawn(command: &EngineCommand, profile: Profile, params: ProfileParams) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env("OCR_PROFILE", profile.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if command.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &command.model_dir {
            cmd.env("OCR_MODEL_DIR", dir);
        }

        let mut child = cmd.spawn().map_err(|e| Error::EngineUnavailable {
            reason: format!("failed to start {}: {}", command.program, e),
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let guard = ChildGuard { child };
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(Error::EngineUnavailable {
                reason: "engine process pipes unavailable".to_string(),
            });
        };

        let mut backend = Self {
            params,
            stdin,
            stdout: BufReader::new(stdout),
            _guard: guard,
        };

        let reply = backend.exchange(None)?;
        if let Some(error) = reply.error {
            return Err(Error::EngineUnavailable { reason: error });
        }
        if reply.ready != Some(true) {
            return Err(Error::EngineUnavailable {
                reason: "engine process did not acknowledge parameters".to_string(),
            });
        }
        debug!(program = %command.program, profile = %profile, "Engine process ready");
        Ok(backend)
    }

    fn exchange(&mut self, image_path: Option<&str>) -> Result<WireResponse> {
        let request = WireRequest {
            image_path,
            params: &self.params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::EngineFailed {
                reason: format!("engine process stdin closed: {e}"),
            })?;

        let mut reply = String::new();
        let n = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| Error::EngineFailed {
                reason: format!("engine process read failed: {e}"),
            })?;
        if n == 0 {
            return Err(Error::EngineFailed {
                reason: "engine process exited".to_string(),
            });
        }
        serde_json::from_str(reply.trim()).map_err(|e| Error::EngineFailed {
            reason: format!("malformed engine reply: {e}"),
        })
    }
}

impl OcrBackend for ProcessBackend {
    fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>> {
        let path = image.to_string_lossy();
        let reply = self.exchange(Some(path.as_ref()))?;
        if let Some(error) = reply.error {
            return Err(Error::EngineFailed { reason: error });
        }
        Ok(reply
            .lines
            .unwrap_or_default()
            .into_iter()
            .map(WireLine::into_fragment)
            .collect())
    }
}

/// Spawns one [`ProcessBackend`] per session
#[derive(Debug, Clone)]
pub struct ProcessBackendFactory {
    command: EngineCommand,
}

impl ProcessBackendFactory {
    pub fn new(command: EngineCommand) -> Self {
        Self { command }
    }
}

impl BackendFactory for ProcessBackendFactory {
    fn build(
        &self,
        profile: Profile,
        params: &ProfileParams,
        stage: BuildStage,
    ) -> Result<Box<dyn OcrBackend>> {
        info!(program = %self.command.program, profile = %profile, stage = ?stage, "Starting engine process");
        Ok(Box::new(ProcessBackend::spawn(&self.command, profile, *params)?))
    }

    fn engine_id(&self) -> String {
        self.command.name.clone()
    }

    fn describe(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("engine_cmd".to_string(), self.command.program.clone());
        if let Some(dir) = &self.command.model_dir {
            out.insert("model_dir".to_string(), dir.display().to_string());
        }
        out
    }
}

//! Line-delimited JSON worker protocol
//!
//! One request per input line, exactly one response line per request, in
//! order. The loop only ends at end of input.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::ocr::{BackendFactory, OcrPayload, Profile, Recognizer, RecognizerOptions, SessionRegistry};

/// What a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Ocr,
    Ping,
}

/// A validated worker request
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRequest {
    pub id: String,
    pub kind: RequestKind,
    pub image_path: String,
    pub profile: Profile,
    pub debug: bool,
}

/// Best-effort id: strings as-is, numbers stringified, anything else empty.
fn request_id(value: &Value) -> String {
    match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Parse one request line. The id is returned even when parsing fails, so
/// the failure response can echo it.
pub fn parse_request(line: &str) -> (String, Result<WorkerRequest>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return (
                String::new(),
                Err(Error::Protocol {
                    reason: format!("malformed request line: {e}"),
                }),
            )
        }
    };
    let id = request_id(&value);
    if !value.is_object() {
        return (
            id,
            Err(Error::Protocol {
                reason: "request must be a JSON object".to_string(),
            }),
        );
    }

    let kind = match value.get("type") {
        None | Some(Value::Null) => RequestKind::Ocr,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "ocr" => RequestKind::Ocr,
            "ping" => RequestKind::Ping,
            other => {
                return (
                    id,
                    Err(Error::Protocol {
                        reason: format!("unknown request type: {other}"),
                    }),
                )
            }
        },
        Some(other) => {
            return (
                id,
                Err(Error::Protocol {
                    reason: format!("request type must be a string, got {other}"),
                }),
            )
        }
    };

    let request = WorkerRequest {
        id: id.clone(),
        kind,
        image_path: value
            .get("image_path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        profile: value
            .get("profile")
            .and_then(Value::as_str)
            .map(Profile::parse_lenient)
            .unwrap_or_default(),
        debug: value.get("debug").and_then(Value::as_bool).unwrap_or(false),
    };
    (id, Ok(request))
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerResponse {
    pub id: String,
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<OcrPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl WorkerResponse {
    /// `{id, success: true}` and nothing else
    pub fn pong(id: String) -> Self {
        Self {
            id,
            success: true,
            payload: None,
            error: None,
            error_kind: None,
            traceback: None,
        }
    }

    pub fn ok(id: String, payload: OcrPayload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::pong(id)
        }
    }

    pub fn failure(id: String, err: &Error) -> Self {
        Self {
            id,
            success: false,
            payload: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            traceback: Some(err.trace()),
        }
    }

    /// Serialize as a single line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "id": self.id,
                "success": false,
                "error": format!("failed to encode response: {e}"),
                "error_kind": ErrorKind::Internal,
            })
            .to_string()
        })
    }
}

/// Worker state: the recognizer (and its sessions) plus what is needed to
/// rebuild it if a recognition task dies.
pub struct Worker {
    recognizer: Option<Recognizer>,
    factory: Arc<dyn BackendFactory>,
    options: RecognizerOptions,
    handled: u64,
}

impl Worker {
    pub fn new(factory: Arc<dyn BackendFactory>, options: RecognizerOptions) -> Self {
        let recognizer = Recognizer::new(SessionRegistry::new(factory.clone()), options.clone());
        Self {
            recognizer: Some(recognizer),
            factory,
            options,
            handled: 0,
        }
    }

    /// Requests answered so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    fn fresh_recognizer(&self) -> Recognizer {
        Recognizer::new(SessionRegistry::new(self.factory.clone()), self.options.clone())
    }

    /// Run blocking recognizer work off the async executor.
    ///
    /// A panicking task only comes back as a join error in unwinding builds;
    /// release builds abort on panic, so the session reset never runs there.
    async fn with_recognizer<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Recognizer) -> T + Send + 'static,
    {
        let mut recognizer = match self.recognizer.take() {
            Some(r) => r,
            None => self.fresh_recognizer(),
        };
        let joined = tokio::task::spawn_blocking(move || {
            let out = f(&mut recognizer);
            (recognizer, out)
        })
        .await;

        match joined {
            Ok((recognizer, out)) => {
                self.recognizer = Some(recognizer);
                Ok(out)
            }
            Err(e) => {
                error!(error = %e, "Recognition task died, resetting sessions");
                self.recognizer = Some(self.fresh_recognizer());
                Err(Error::EngineFailed {
                    reason: format!("recognition task failed: {e}"),
                })
            }
        }
    }

    /// Best-effort pre-build of all sessions.
    pub async fn warm_up(&mut self) {
        if let Err(e) = self.with_recognizer(|r| r.registry_mut().warm_up()).await {
            warn!(error = %e, "Warmup failed");
        }
    }

    /// Handle one input line. Blank lines produce no response.
    pub async fn handle_line(&mut self, line: &str) -> Option<WorkerResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.handled += 1;

        let (id, parsed) = parse_request(line);
        let request = match parsed {
            Ok(r) => r,
            Err(e) => {
                warn!(id = %id, error = %e, "Rejected request");
                return Some(WorkerResponse::failure(id, &e));
            }
        };

        match request.kind {
            RequestKind::Ping => Some(WorkerResponse::pong(request.id)),
            RequestKind::Ocr => {
                debug!(id = %request.id, profile = %request.profile, path = %request.image_path, "OCR request");
                let WorkerRequest {
                    id,
                    image_path,
                    profile,
                    debug,
                    ..
                } = request;
                let result = self
                    .with_recognizer(move |r| r.recognize(&image_path, profile, debug))
                    .await
                    .and_then(|r| r);
                Some(match result {
                    Ok(payload) => WorkerResponse::ok(id, payload),
                    Err(e) => {
                        warn!(id = %id, error = %e, kind = ?e.kind(), "OCR request failed");
                        WorkerResponse::failure(id, &e)
                    }
                })
            }
        }
    }

    /// Serve requests from `reader` until end of input.
    pub async fn run<R, W>(mut self, mut reader: R, mut writer: W) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Worker ready");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let response = match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line).await,
                Err(e) => {
                    self.handled += 1;
                    let err = Error::Protocol {
                        reason: format!("request line is not valid UTF-8: {e}"),
                    };
                    warn!(error = %err, "Rejected request");
                    Some(WorkerResponse::failure(String::new(), &err))
                }
            };
            if let Some(response) = response {
                let mut out = response.to_line();
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!(handled = self.handled, "End of input, worker stopping");
        Ok(self.handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_ping() {
        let (id, req) = parse_request(r#"{"id":"7","type":"ping"}"#);
        assert_eq!(id, "7");
        assert_eq!(req.unwrap().kind, RequestKind::Ping);
    }

    #[test]
    fn test_parse_defaults() {
        let (_, req) = parse_request(r#"{"id":3,"image_path":"/tmp/a.png","profile":"PDF"}"#);
        let req = req.unwrap();
        assert_eq!(
            req,
            WorkerRequest {
                id: "3".to_string(),
                kind: RequestKind::Ocr,
                image_path: "/tmp/a.png".to_string(),
                profile: Profile::Pdf,
                debug: false,
            }
        );
        let (_, req) = parse_request(r#"{"profile":"weird","debug":true}"#);
        let req = req.unwrap();
        assert_eq!(req.profile, Profile::Default);
        assert!(req.debug);
        assert_eq!(req.id, "");
    }

    #[test]
    fn test_parse_errors_keep_id() {
        let (id, req) = parse_request("{not json");
        assert_eq!(id, "");
        assert!(matches!(req, Err(Error::Protocol { .. })));

        let (id, req) = parse_request(r#"{"id":"9","type":"shutdown"}"#);
        assert_eq!(id, "9");
        assert!(matches!(req, Err(Error::Protocol { .. })));

        let (id, req) = parse_request("[1,2]");
        assert_eq!(id, "");
        assert!(req.is_err());
    }

    #[test]
    fn test_pong_has_only_id_and_success() {
        let line = WorkerResponse::pong("7".to_string()).to_line();
        assert_eq!(serde_json::from_str::<Value>(&line).unwrap(), json!({"id": "7", "success": true}));
    }

    #[test]
    fn test_failure_shape() {
        let resp = WorkerResponse::failure(
            "x".to_string(),
            &Error::ImageNotFound {
                path: "/nope.png".to_string(),
            },
        );
        let value: Value = serde_json::from_str(&resp.to_line()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Image file not found: /nope.png");
        assert_eq!(value["error_kind"], "input");
        assert!(value["traceback"].is_string());
    }
}

//! Engine run results and per-variant reports

use serde::{Deserialize, Serialize};

use crate::layout::TextFragment;

/// Which construction path produced the engine that ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Built with the profile's parameters
    #[default]
    Primary,
    /// Built with engine defaults after the primary construction failed
    Fallback,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Primary => "primary",
            Backend::Fallback => "fallback",
        }
    }
}

/// Output of one engine invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResult {
    pub fragments: Vec<TextFragment>,
    pub backend: Backend,
    /// Recoverable failures met while producing this result
    pub errors: Vec<String>,
}

/// An engine result after reconstruction, with its selection score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    /// Reconstructed lines in reading order
    pub lines: Vec<TextFragment>,
    pub text: String,
    pub backend: Backend,
    pub errors: Vec<String>,
    pub score: f64,
}

impl ScoredResult {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Character count of the joined text
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }

    /// Strict comparison: equal scores keep the incumbent.
    pub fn beats(&self, incumbent: &ScoredResult) -> bool {
        self.score > incumbent.score
    }

    pub fn report(&self, variant: &str) -> VariantReport {
        VariantReport {
            variant: variant.to_string(),
            score: self.score,
            lines: self.line_count(),
            chars: self.chars(),
            backend: Some(self.backend),
            backend_errors: self.errors.clone(),
            error: None,
        }
    }
}

/// Debug summary of one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantReport {
    pub variant: String,
    pub score: f64,
    pub lines: usize,
    pub chars: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_errors: Vec<String>,
    /// Set when the pass was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VariantReport {
    pub fn skipped(variant: &str, error: impl Into<String>) -> Self {
        Self {
            variant: variant.to_string(),
            score: 0.0,
            lines: 0,
            chars: 0,
            backend: None,
            backend_errors: Vec::new(),
            error: Some(error.into()),
        }
    }
}

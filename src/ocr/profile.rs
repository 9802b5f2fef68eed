//! Processing profiles and their engine parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named tuning configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Photos and screenshots
    #[default]
    Default,
    /// Rasterized PDF pages (small invoice fields)
    Pdf,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Default, Profile::Pdf];

    /// Lenient parse: trimmed, case-insensitive; anything unknown is `Default`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Profile::Pdf,
            _ => Profile::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Pdf => "pdf",
        }
    }

    /// Whether label/value splicing applies to this profile's output.
    pub fn merges_labels(&self) -> bool {
        matches!(self, Profile::Default)
    }

    /// Multipass level when none is configured.
    pub fn default_multipass(&self) -> u8 {
        match self {
            Profile::Default => 0,
            Profile::Pdf => 1,
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Profile::Default),
            "pdf" => Ok(Profile::Pdf),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

/// Engine tuning knobs. `None` leaves the engine default in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileParams {
    /// Longest image side the engine may keep before downscaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_side_len: Option<u32>,
    /// Minimum detectable text height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    /// Recognition confidence below which text is dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_score: Option<f64>,
}

impl ProfileParams {
    /// Parameters for a profile. `pdf` keeps more pixels and accepts smaller,
    /// less certain text so small form fields survive.
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Default => Self::default(),
            Profile::Pdf => Self {
                max_side_len: Some(4096),
                min_height: Some(10),
                text_score: Some(0.35),
            },
        }
    }

    /// Apply caller overrides on top of these parameters.
    pub fn with_overrides(self, overrides: &ProfileParams) -> Self {
        Self {
            max_side_len: overrides.max_side_len.or(self.max_side_len),
            min_height: overrides.min_height.or(self.min_height),
            text_score: overrides.text_score.or(self.text_score),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max_side_len.is_none() && self.min_height.is_none() && self.text_score.is_none()
    }

    /// Flat `key -> value` view for response summaries.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(v) = self.max_side_len {
            out.insert("max_side_len".to_string(), v.to_string());
        }
        if let Some(v) = self.min_height {
            out.insert("min_height".to_string(), v.to_string());
        }
        if let Some(v) = self.text_score {
            out.insert("text_score".to_string(), v.to_string());
        }
        out
    }
}

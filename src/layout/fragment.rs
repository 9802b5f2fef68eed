//! Positioned text fragments produced by OCR and PDF engines

use serde::{Deserialize, Serialize};

use super::geometry::BoundingMetrics;

/// One corner point, `[x, y]` in image (top-down) coordinates
pub type Point = [f64; 2];

/// A unit of recognized or extracted text with an optional position.
///
/// Fragments are immutable once produced; the label/value merger builds new
/// ones instead of editing in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Engine confidence in `[0, 1]`; PDF spans carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Corner points, usually four, in engine order
    #[serde(default, rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Point>>,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, confidence: Option<f64>, bbox: Option<Vec<Point>>) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
        }
    }

    /// Fragment spanning the axis-aligned rectangle `(left, top)..(right, bottom)`.
    pub fn from_rect(
        text: impl Into<String>,
        confidence: Option<f64>,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
    ) -> Self {
        Self::new(
            text,
            confidence,
            Some(vec![
                [left, top],
                [right, top],
                [right, bottom],
                [left, bottom],
            ]),
        )
    }

    /// Geometry derived from the corner points, if any are usable.
    pub fn metrics(&self) -> Option<BoundingMetrics> {
        self.bbox.as_deref().and_then(BoundingMetrics::from_points)
    }

    /// Copy of this fragment carrying different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: self.confidence,
            bbox: self.bbox.clone(),
        }
    }
}

/// Join fragment texts with newlines, the way responses report `text`.
pub fn join_lines(fragments: &[TextFragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

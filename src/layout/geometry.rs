//! Bounding-box math shared by the layout passes

use super::fragment::Point;

/// Axis-aligned extent of a fragment's corner points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingMetrics {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub center_x: f64,
    pub center_y: f64,
    /// Never below 1.0 so degenerate boxes still count as a line
    pub height: f64,
}

impl BoundingMetrics {
    /// Compute metrics from corner points. Returns `None` when no point has
    /// finite coordinates.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let mut finite = points
            .iter()
            .filter(|[x, y]| x.is_finite() && y.is_finite());
        let first = finite.next()?;

        let (mut left, mut right, mut top, mut bottom) = (first[0], first[0], first[1], first[1]);
        for [x, y] in finite {
            left = left.min(*x);
            right = right.max(*x);
            top = top.min(*y);
            bottom = bottom.max(*y);
        }

        Some(Self {
            left,
            right,
            top,
            bottom,
            center_x: (left + right) / 2.0,
            center_y: (top + bottom) / 2.0,
            height: (bottom - top).max(1.0),
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }
}

/// Median of a set of values; the mean of the middle pair for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

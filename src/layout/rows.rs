//! Reading-order reconstruction: cluster fragments into visual rows

use super::fragment::TextFragment;
use super::geometry::{median, BoundingMetrics};

/// Row tolerance formula: `max(floor, median_height * multiplier)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowTolerance {
    pub multiplier: f64,
    pub floor: f64,
}

impl RowTolerance {
    /// Used for OCR text lines
    pub const OCR_LINES: RowTolerance = RowTolerance {
        multiplier: 0.6,
        floor: 5.0,
    };

    /// Used for PDF text spans
    pub const PDF_SPANS: RowTolerance = RowTolerance {
        multiplier: 0.7,
        floor: 6.0,
    };

    pub fn resolve(&self, median_height: f64) -> f64 {
        (median_height * self.multiplier).max(self.floor)
    }
}

impl Default for RowTolerance {
    fn default() -> Self {
        Self::OCR_LINES
    }
}

/// A fragment paired with its geometry
#[derive(Debug, Clone)]
pub struct Placed {
    pub fragment: TextFragment,
    pub metrics: BoundingMetrics,
}

/// Fragments on one visual line, sorted left to right
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub items: Vec<Placed>,
}

impl Row {
    /// Smallest `top` among the row's fragments.
    pub fn top(&self) -> f64 {
        self.items
            .iter()
            .map(|p| p.metrics.top)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.items
            .iter()
            .map(|p| p.metrics.bottom)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Texts joined with `sep`, skipping blank fragments.
    pub fn text(&self, sep: &str) -> String {
        self.items
            .iter()
            .map(|p| p.fragment.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(sep)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &TextFragment> {
        self.items.iter().map(|p| &p.fragment)
    }
}

/// Output of [`cluster_rows`]
#[derive(Debug, Clone, Default)]
pub struct Clustered {
    /// Rows in top-to-bottom order
    pub rows: Vec<Row>,
    /// Tolerance that was applied
    pub tolerance: f64,
    /// Fragments without usable geometry, in their original relative order
    pub unplaced: Vec<TextFragment>,
}

impl Clustered {
    /// Flatten into reading order: rows first, then unplaced fragments.
    pub fn into_reading_order(self) -> Vec<TextFragment> {
        let mut out: Vec<TextFragment> = self
            .rows
            .into_iter()
            .flat_map(|row| row.items.into_iter().map(|p| p.fragment))
            .collect();
        out.extend(self.unplaced);
        out
    }
}

/// Group fragments into rows.
///
/// Fragments are scanned in `(top, left)` order; a new row starts whenever a
/// fragment's top lies below the running row's lowest bottom by more than the
/// tolerance. Each finished row is sorted by `left`.
pub fn cluster_rows(fragments: Vec<TextFragment>, tolerance: RowTolerance) -> Clustered {
    let mut placed = Vec::with_capacity(fragments.len());
    let mut unplaced = Vec::new();
    for fragment in fragments {
        match fragment.metrics() {
            Some(metrics) => placed.push(Placed { fragment, metrics }),
            None => unplaced.push(fragment),
        }
    }

    let heights: Vec<f64> = placed.iter().map(|p| p.metrics.height).collect();
    let row_tol = match median(&heights) {
        Some(h) => tolerance.resolve(h),
        None => {
            return Clustered {
                rows: Vec::new(),
                tolerance: tolerance.floor,
                unplaced,
            }
        }
    };

    // Stable sort keeps engine order for exact ties
    placed.sort_by(|a, b| {
        a.metrics
            .top
            .total_cmp(&b.metrics.top)
            .then(a.metrics.left.total_cmp(&b.metrics.left))
    });

    let mut rows: Vec<Row> = Vec::new();
    let mut current = Row::default();
    let mut current_bottom = f64::NEG_INFINITY;
    for p in placed {
        if !current.items.is_empty() && p.metrics.top > current_bottom + row_tol {
            rows.push(std::mem::take(&mut current));
            current_bottom = f64::NEG_INFINITY;
        }
        current_bottom = current_bottom.max(p.metrics.bottom);
        current.items.push(p);
    }
    if !current.items.is_empty() {
        rows.push(current);
    }

    for row in &mut rows {
        row.items
            .sort_by(|a, b| a.metrics.left.total_cmp(&b.metrics.left));
    }

    Clustered {
        rows,
        tolerance: row_tol,
        unplaced,
    }
}

/// Reorder fragments into reading order.
pub fn reading_order(fragments: Vec<TextFragment>, tolerance: RowTolerance) -> Vec<TextFragment> {
    cluster_rows(fragments, tolerance).into_reading_order()
}

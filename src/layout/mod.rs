//! Spatial text reconstruction
//!
//! Turns scattered, positioned fragments into reading order, splices
//! label/value pairs and assigns form zones. Everything here is pure and
//! engine-agnostic.

mod fragment;
mod geometry;
mod labels;
mod rows;
mod zones;

pub use fragment::{join_lines, Point, TextFragment};
pub use geometry::{median, BoundingMetrics};
pub use labels::{merge_labels_with_values, LabelVocabulary, MergeLimits, LABEL_VALUE_SEPARATOR};
pub use rows::{cluster_rows, reading_order, Clustered, Placed, Row, RowTolerance};
pub use zones::{zone_for, Zone, ZoneThresholds};

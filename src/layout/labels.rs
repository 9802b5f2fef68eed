//! Label/value splicing for screenshot-style layouts

use std::collections::{BTreeSet, HashSet};

use super::fragment::TextFragment;
use super::geometry::BoundingMetrics;

/// Separator placed between a label and its spliced value
pub const LABEL_VALUE_SEPARATOR: char = '：';

/// Field names that appear as standalone labels in payment screenshots and
/// receipt headers.
const DEFAULT_LABELS: &[&str] = &[
    "交易单号",
    "交易号",
    "商户单号",
    "订单号",
    "流水号",
    "转账单号",
    "支付时间",
    "付款时间",
    "创建时间",
    "交易时间",
    "转账时间",
    "商户全称",
    "商家",
    "收款方",
    "收款户",
    "收款账户",
    "付款方",
    "收单机构",
    "清算机构",
    "支付方式",
    "付款方式",
    "当前状态",
    "商品",
    "商品说明",
    "发票代码",
    "发票号码",
    "开票日期",
    "校验码",
];

/// Geometry limits for pairing a label with its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeLimits {
    /// How far the value may start left of the label's right edge
    pub overlap_slack: f64,
    /// Maximum vertical center distance
    pub max_dy: f64,
    /// Weight of vertical distance in the pairing cost
    pub dy_weight: f64,
}

impl Default for MergeLimits {
    fn default() -> Self {
        Self {
            overlap_slack: 5.0,
            max_dy: 22.0,
            dy_weight: 10.0,
        }
    }
}

/// Closed set of known field labels, matched on trimmed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    labels: BTreeSet<String>,
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_LABELS.iter().copied())
    }
}

impl LabelVocabulary {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.labels.contains(text.trim())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Splice each label's nearest right-hand value into `"<label>：<value>"`.
///
/// Consumed value fragments are dropped from the output. When nothing was
/// merged the input is returned unchanged.
pub fn merge_labels_with_values(
    fragments: Vec<TextFragment>,
    vocabulary: &LabelVocabulary,
    limits: MergeLimits,
) -> Vec<TextFragment> {
    if fragments.is_empty() || vocabulary.is_empty() {
        return fragments;
    }

    let geometry: Vec<Option<BoundingMetrics>> = fragments.iter().map(|f| f.metrics()).collect();
    let mut out = fragments.clone();
    let mut used: HashSet<usize> = HashSet::new();

    for (label_idx, label) in fragments.iter().enumerate() {
        let Some(label_box) = geometry[label_idx] else {
            continue;
        };
        if used.contains(&label_idx) || !vocabulary.contains(&label.text) {
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for (value_idx, value_box) in geometry.iter().enumerate() {
            let Some(value_box) = value_box else {
                continue;
            };
            if value_idx == label_idx || used.contains(&value_idx) {
                continue;
            }
            if value_box.left < label_box.right - limits.overlap_slack {
                continue;
            }
            let dy = (value_box.center_y - label_box.center_y).abs();
            if dy > limits.max_dy {
                continue;
            }
            let cost = dy * limits.dy_weight + (value_box.left - label_box.right);
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((value_idx, cost));
            }
        }

        if let Some((value_idx, _)) = best {
            let value = out[value_idx].text.trim().to_string();
            if value.is_empty() {
                continue;
            }
            let merged = format!(
                "{}{}{}",
                out[label_idx].text.trim(),
                LABEL_VALUE_SEPARATOR,
                value
            );
            out[label_idx] = out[label_idx].with_text(merged);
            used.insert(value_idx);
        }
    }

    if used.is_empty() {
        return fragments;
    }

    out.into_iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, f)| f)
        .collect()
}

//! Layouts over PDF text spans: zoned sections, clustered rows, raw text

use serde::{Deserialize, Serialize};

use super::reader::PageSpans;
use crate::layout::{cluster_rows, Row, RowTolerance, Zone, ZoneThresholds};

/// Requested text layout for a PDF text layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Section-headed text grouped by form zone
    #[default]
    Zones,
    /// Rows clustered top-to-bottom, spans joined by a space
    Ordered,
    /// PDFium's native text
    Raw,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Zones => "zones",
            LayoutMode::Ordered => "ordered",
            LayoutMode::Raw => "raw",
        }
    }

    /// This mode followed by every lower-fidelity mode.
    pub fn fallback_chain(&self) -> &'static [LayoutMode] {
        match self {
            LayoutMode::Zones => &[LayoutMode::Zones, LayoutMode::Ordered, LayoutMode::Raw],
            LayoutMode::Ordered => &[LayoutMode::Ordered, LayoutMode::Raw],
            LayoutMode::Raw => &[LayoutMode::Raw],
        }
    }
}

impl std::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zones" => Ok(LayoutMode::Zones),
            "ordered" => Ok(LayoutMode::Ordered),
            "raw" => Ok(LayoutMode::Raw),
            other => Err(format!("unknown layout: {other}")),
        }
    }
}

/// Span geometry in zoned output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub t: String,
}

/// One visual row inside a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonedRow {
    pub region: Zone,
    pub y0: f64,
    pub y1: f64,
    pub text: String,
    pub spans: Vec<SpanBox>,
}

/// A page's rows grouped by zone, zones in page order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonedPage {
    pub page: usize,
    pub width: f64,
    pub height: f64,
    pub rows: Vec<ZonedRow>,
}

fn row_text(row: &Row) -> String {
    row.text(" ")
}

/// Row-clustered page text, one row per line.
pub fn ordered_text(page: &PageSpans) -> String {
    cluster_rows(page.spans.clone(), RowTolerance::PDF_SPANS)
        .rows
        .iter()
        .map(row_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assign spans to zones, then cluster each zone into rows.
pub fn zoned_page(page: &PageSpans, thresholds: &ZoneThresholds) -> ZonedPage {
    let mut by_zone: Vec<(Zone, Vec<_>)> = Zone::ALL.iter().map(|z| (*z, Vec::new())).collect();
    for span in &page.spans {
        let Some(m) = span.metrics() else {
            continue;
        };
        let zone = thresholds.zone_at(m.center_x, m.center_y, page.width, page.height);
        if let Some((_, bucket)) = by_zone.iter_mut().find(|(z, _)| *z == zone) {
            bucket.push(span.clone());
        }
    }

    let mut rows = Vec::new();
    for (zone, spans) in by_zone {
        for row in cluster_rows(spans, RowTolerance::PDF_SPANS).rows {
            let text = row_text(&row);
            if text.is_empty() {
                continue;
            }
            rows.push(ZonedRow {
                region: zone,
                y0: row.top(),
                y1: row.bottom(),
                text,
                spans: row
                    .items
                    .iter()
                    .map(|p| SpanBox {
                        x0: p.metrics.left,
                        y0: p.metrics.top,
                        x1: p.metrics.right,
                        y1: p.metrics.bottom,
                        t: p.fragment.text.clone(),
                    })
                    .collect(),
            });
        }
    }

    ZonedPage {
        page: page.page,
        width: page.width,
        height: page.height,
        rows,
    }
}

/// Render a zoned page as section-headed text.
///
/// Empty when the page has no rows. Zones sharing a section title are
/// emitted under one heading.
pub fn zones_text(page: &ZonedPage) -> String {
    if page.rows.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("【第{}页-分区】", page.page)];
    let mut current_title: Option<&str> = None;
    for row in &page.rows {
        let title = row.region.section_title();
        if current_title != Some(title) {
            lines.push(format!("【{title}】"));
            current_title = Some(title);
        }
        lines.push(row.text.clone());
    }
    lines.join("\n")
}

/// Page text in one specific mode, without fallback.
pub fn page_text(page: &PageSpans, mode: LayoutMode, thresholds: &ZoneThresholds) -> String {
    match mode {
        LayoutMode::Zones => zones_text(&zoned_page(page, thresholds)),
        LayoutMode::Ordered => ordered_text(page),
        LayoutMode::Raw => page.raw_text.trim_end().to_string(),
    }
}

/// Whole-document text in one mode.
pub fn document_text(pages: &[PageSpans], mode: LayoutMode, thresholds: &ZoneThresholds) -> String {
    pages
        .iter()
        .map(|p| page_text(p, mode, thresholds))
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Document text in the requested mode, falling back to lower-fidelity modes
/// while the result is blank. Returns the mode that produced the text.
pub fn document_text_with_fallback(
    pages: &[PageSpans],
    requested: LayoutMode,
    thresholds: &ZoneThresholds,
) -> (String, LayoutMode) {
    for mode in requested.fallback_chain() {
        let text = document_text(pages, *mode, thresholds);
        if !text.trim().is_empty() {
            return (text, *mode);
        }
    }
    (String::new(), requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextFragment;
    use pretty_assertions::assert_eq;

    fn span(t: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> TextFragment {
        TextFragment::from_rect(t, None, x0, y0, x1, y1)
    }

    fn invoice_page() -> PageSpans {
        PageSpans {
            page: 1,
            width: 1000.0,
            height: 1000.0,
            spans: vec![
                span("发票号码：", 600.0, 50.0, 700.0, 62.0),
                span("2531200", 705.0, 50.0, 800.0, 62.0),
                span("电子发票", 100.0, 50.0, 200.0, 62.0),
                span("名称：某某公司", 50.0, 300.0, 300.0, 312.0),
                span("03*7<>", 700.0, 300.0, 900.0, 312.0),
                span("*服务*话费", 50.0, 600.0, 200.0, 612.0),
                span("200.00", 600.0, 601.0, 700.0, 613.0),
                span("销售方名称", 50.0, 800.0, 200.0, 812.0),
                span("备注内容", 700.0, 800.0, 900.0, 812.0),
                span("开票人：张三", 50.0, 950.0, 200.0, 962.0),
            ],
            raw_text: "raw layer\n".to_string(),
        }
    }

    #[test]
    fn test_zones_text_sections() {
        let zoned = zoned_page(&invoice_page(), &ZoneThresholds::default());
        let expected = [
            "【第1页-分区】",
            "【发票信息】",
            "电子发票",
            "发票号码： 2531200",
            "【购买方】",
            "名称：某某公司",
            "【密码区】",
            "03*7<>",
            "【明细】",
            "*服务*话费 200.00",
            "【销售方】",
            "销售方名称",
            "【备注/其他】",
            "备注内容",
            "开票人：张三",
        ]
        .join("\n");
        assert_eq!(zones_text(&zoned), expected);
    }

    #[test]
    fn test_zoned_rows_carry_geometry() {
        let zoned = zoned_page(&invoice_page(), &ZoneThresholds::default());
        let items: Vec<&ZonedRow> = zoned.rows.iter().filter(|r| r.region == Zone::Items).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].y0, 600.0);
        assert_eq!(items[0].y1, 613.0);
        assert_eq!(items[0].spans[1].t, "200.00");
        let json = serde_json::to_value(&zoned).unwrap();
        assert_eq!(json["rows"][0]["region"], "header_left");
    }

    #[test]
    fn test_ordered_text() {
        let text = ordered_text(&invoice_page());
        assert_eq!(text.lines().next(), Some("电子发票 发票号码： 2531200"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_fallback_to_raw_when_no_spans() {
        let mut page = invoice_page();
        page.spans.clear();
        let (text, mode) =
            document_text_with_fallback(&[page], LayoutMode::Zones, &ZoneThresholds::default());
        assert_eq!(mode, LayoutMode::Raw);
        assert_eq!(text, "raw layer");
    }

    #[test]
    fn test_fallback_keeps_requested_when_blank() {
        let page = PageSpans {
            page: 1,
            width: 0.0,
            height: 0.0,
            spans: Vec::new(),
            raw_text: "  ".to_string(),
        };
        let (text, mode) =
            document_text_with_fallback(&[page], LayoutMode::Ordered, &ZoneThresholds::default());
        assert_eq!(text, "");
        assert_eq!(mode, LayoutMode::Ordered);
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("Zones".parse::<LayoutMode>(), Ok(LayoutMode::Zones));
        assert!("columns".parse::<LayoutMode>().is_err());
        assert_eq!(LayoutMode::Ordered.fallback_chain(), &[LayoutMode::Ordered, LayoutMode::Raw]);
    }
}

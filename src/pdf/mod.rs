//! PDF processing layer
//!
//! Text-layer extraction through PDFium with zoned/ordered/raw layouts, and
//! page rasterization for OCR fallback.

mod quality;
mod reader;
mod render;
mod spans;

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::layout::ZoneThresholds;

pub use quality::{is_han, is_useful_pdf_text, TextQuality};
pub use reader::{extract_pages, PageSpans};
pub use render::{render_pages_to_png, sanitize_dpi, RenderedPage, DEFAULT_DPI, MAX_DPI, MIN_DPI};
pub use spans::{
    document_text, document_text_with_fallback, ordered_text, page_text, zoned_page, zones_text,
    LayoutMode, SpanBox, ZonedPage, ZonedRow,
};

pub const EXTRACTOR: &str = "pdfium";

/// Text-layer extraction result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfTextResult {
    pub success: bool,
    pub text: String,
    pub raw_text: String,
    /// Layout that actually produced `text`
    pub layout: LayoutMode,
    pub page_count: usize,
    pub extractor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<ZonedPage>>,
}

/// Build a text result from already-extracted pages.
pub fn text_result(pages: &[PageSpans], layout: LayoutMode, include_pages: bool) -> PdfTextResult {
    let thresholds = ZoneThresholds::default();
    let (text, used) = document_text_with_fallback(pages, layout, &thresholds);
    let raw_text = document_text(pages, LayoutMode::Raw, &thresholds);
    PdfTextResult {
        success: true,
        text,
        raw_text,
        layout: used,
        page_count: pages.len(),
        extractor: EXTRACTOR.to_string(),
        pages: include_pages.then(|| pages.iter().map(|p| zoned_page(p, &thresholds)).collect()),
    }
}

/// Extract a PDF's text layer in the requested layout.
pub fn extract_pdf_text(path: &Path, layout: LayoutMode, include_pages: bool) -> Result<PdfTextResult> {
    let pages = extract_pages(path)?;
    let result = text_result(&pages, layout, include_pages);
    info!(
        path = %path.display(),
        pages = result.page_count,
        layout = %result.layout,
        chars = result.text.chars().count(),
        "PDF text extracted"
    );
    Ok(result)
}

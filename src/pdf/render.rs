//! Page rasterization for OCR fallback

use std::path::{Path, PathBuf};

use pdfium_render::prelude::*;
use tracing::debug;

use super::reader::{create_pdfium, map_pdfium_error, read_pdf};
use crate::error::{Error, Result};

pub const DEFAULT_DPI: u32 = 220;
pub const MIN_DPI: u32 = 120;
pub const MAX_DPI: u32 = 450;

/// Out-of-range values fall back to the default.
pub fn sanitize_dpi(dpi: u32) -> u32 {
    if (MIN_DPI..=MAX_DPI).contains(&dpi) {
        dpi
    } else {
        DEFAULT_DPI
    }
}

/// A rendered page on disk
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// 1-indexed
    pub page: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Render every page of `pdf` to `<out_dir>/page-<n>.png` at `dpi`.
pub fn render_pages_to_png(pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<RenderedPage>> {
    let data = read_pdf(pdf)?;
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(&data, None)
        .map_err(map_pdfium_error)?;

    let scale = sanitize_dpi(dpi) as f32 / 72.0;
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .render_form_data(true)
        .render_annotations(true);

    let mut rendered = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_num = index + 1;
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to render page {}: {}", page_num, e),
            })?;

        let dynamic_image = bitmap.as_image();
        let path = out_dir.join(format!("page-{page_num}.png"));
        dynamic_image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to encode page {} as PNG: {}", page_num, e),
            })?;

        rendered.push(RenderedPage {
            page: page_num,
            path,
            width: dynamic_image.width(),
            height: dynamic_image.height(),
        });
    }

    debug!(pages = rendered.len(), dpi, "Rendered PDF pages");
    Ok(rendered)
}

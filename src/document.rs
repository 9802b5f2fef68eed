//! Combined document flow
//!
//! PDFs use their text layer when it is usable and fall back to rendering
//! every page and running OCR with the `pdf` profile. Images get one OCR cycle.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ocr::{Backend, OcrPayload, Profile, Recognizer};
use crate::pdf::{extract_pages, is_useful_pdf_text, render_pages_to_png, text_result, LayoutMode};

const PAGE_DIR_PREFIX: &str = "ocr-pages-";

/// Where a document's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    PdfText,
    Ocr,
}

/// OCR outcome for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOcr {
    pub page: usize,
    pub line_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageOcr {
    fn from_payload(page: usize, payload: &OcrPayload) -> Self {
        Self {
            page,
            line_count: payload.line_count,
            variant: Some(payload.variant.clone()),
            backend: Some(payload.backend),
            error: None,
        }
    }

    fn failed(page: usize, error: impl Into<String>) -> Self {
        Self {
            page,
            line_count: 0,
            variant: None,
            backend: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentResult {
    pub success: bool,
    pub source: TextSource,
    pub text: String,
    pub page_count: usize,
    /// Text-layer layout, when the text came from the PDF itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageOcr>,
}

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
}

/// OCR already-rendered page images in order.
///
/// Pages that fail or come back blank are reported and skipped; it is an
/// error only when no page produced text.
pub fn ocr_page_images(recognizer: &mut Recognizer, images: &[(usize, PathBuf)]) -> Result<(String, Vec<PageOcr>)> {
    let mut texts = Vec::new();
    let mut pages = Vec::with_capacity(images.len());

    for (page, path) in images {
        info!(page, total = images.len(), "OCR page");
        match recognizer.recognize(&path.to_string_lossy(), Profile::Pdf, false) {
            Ok(payload) if payload.text.trim().is_empty() => {
                warn!(page, "OCR returned no text for page");
                pages.push(PageOcr::from_payload(*page, &payload));
            }
            Ok(payload) => {
                pages.push(PageOcr::from_payload(*page, &payload));
                texts.push(payload.text);
            }
            Err(e) => {
                warn!(page, error = %e, "OCR failed for page");
                pages.push(PageOcr::failed(*page, e.to_string()));
            }
        }
    }

    if texts.is_empty() {
        return Err(Error::EngineFailed {
            reason: "no text could be extracted from PDF page images".to_string(),
        });
    }
    Ok((texts.join("\n"), pages))
}

fn extract_pdf(path: &Path, dpi: u32, recognizer: &mut Recognizer) -> Result<DocumentResult> {
    let spans = extract_pages(path)?;
    let layer = text_result(&spans, LayoutMode::Zones, false);
    if is_useful_pdf_text(&layer.raw_text) {
        info!(path = %path.display(), layout = %layer.layout, "Using PDF text layer");
        return Ok(DocumentResult {
            success: true,
            source: TextSource::PdfText,
            text: layer.text,
            page_count: layer.page_count,
            layout: Some(layer.layout),
            pages: Vec::new(),
        });
    }

    info!(path = %path.display(), dpi, "PDF text layer unusable, falling back to OCR");
    let dir = recognizer.options().scratch_dir(PAGE_DIR_PREFIX)?;
    let rendered = render_pages_to_png(path, dpi, dir.path())?;
    let images: Vec<(usize, PathBuf)> = rendered.into_iter().map(|r| (r.page, r.path)).collect();
    let (text, pages) = ocr_page_images(recognizer, &images)?;

    Ok(DocumentResult {
        success: true,
        source: TextSource::Ocr,
        text,
        page_count: images.len(),
        layout: None,
        pages,
    })
}

/// Extract text from a PDF or an image.
pub fn extract_document(path: &Path, dpi: u32, recognizer: &mut Recognizer) -> Result<DocumentResult> {
    if path.as_os_str().is_empty() {
        return Err(Error::EmptyPath);
    }
    if is_pdf_path(path) {
        return extract_pdf(path, dpi, recognizer);
    }

    let payload = recognizer.recognize(&path.to_string_lossy(), Profile::Default, false)?;
    Ok(DocumentResult {
        success: true,
        source: TextSource::Ocr,
        page_count: 1,
        layout: None,
        pages: vec![PageOcr::from_payload(1, &payload)],
        text: payload.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextFragment;
    use crate::ocr::{BackendFactory, BuildStage, OcrBackend, ProfileParams, RecognizerOptions, SessionRegistry};
    use image::{DynamicImage, RgbImage};
    use std::sync::Arc;

    /// Reads back a fixed line, except for files named `blank*`
    struct Fixed;

    impl OcrBackend for Fixed {
        fn infer(&mut self, image: &Path) -> Result<Vec<TextFragment>> {
            let name = image.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if name.starts_with("blank") {
                return Ok(Vec::new());
            }
            Ok(vec![TextFragment::from_rect(name, Some(0.9), 0.0, 0.0, 80.0, 20.0)])
        }
    }

    struct FixedFactory;

    impl BackendFactory for FixedFactory {
        fn build(&self, _: Profile, _: &ProfileParams, _: BuildStage) -> Result<Box<dyn OcrBackend>> {
            Ok(Box::new(Fixed))
        }

        fn engine_id(&self) -> String {
            "fixed".to_string()
        }
    }

    fn recognizer() -> Recognizer {
        // multipass 0 keeps every profile to a single pass
        let options = RecognizerOptions {
            multipass: Some(0),
            ..Default::default()
        };
        Recognizer::new(SessionRegistry::new(Arc::new(FixedFactory)), options)
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255])))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_is_pdf_path() {
        assert!(is_pdf_path(Path::new("/tmp/a.PDF")));
        assert!(is_pdf_path(Path::new("scan.pdf")));
        assert!(!is_pdf_path(Path::new("scan.png")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }

    #[test]
    fn test_image_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "invoice.png");
        let result = extract_document(&path, 220, &mut recognizer()).unwrap();
        assert_eq!(result.source, TextSource::Ocr);
        assert_eq!(result.text, "invoice.png");
        assert_eq!(result.page_count, 1);
        assert_eq!(result.pages[0].variant.as_deref(), Some("original"));
    }

    #[test]
    fn test_missing_inputs() {
        let mut rec = recognizer();
        assert!(matches!(extract_document(Path::new(""), 220, &mut rec), Err(Error::EmptyPath)));
        assert!(matches!(
            extract_document(Path::new("/nonexistent/x.png"), 220, &mut rec),
            Err(Error::ImageNotFound { .. })
        ));
        assert!(matches!(
            extract_document(Path::new("/nonexistent/x.pdf"), 220, &mut rec),
            Err(Error::PdfNotFound { .. })
        ));
    }

    #[test]
    fn test_page_images_skip_blank_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            (1, write_png(dir.path(), "page-1.png")),
            (2, write_png(dir.path(), "blank-2.png")),
            (3, dir.path().join("gone.png")),
            (4, write_png(dir.path(), "page-4.png")),
        ];
        let (text, pages) = ocr_page_images(&mut recognizer(), &images).unwrap();
        assert_eq!(text, "page-1.png\npage-4.png");
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[1].line_count, 0);
        assert!(pages[2].error.is_some());
    }

    #[test]
    fn test_page_images_all_blank_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![(1, write_png(dir.path(), "blank-1.png"))];
        assert!(matches!(
            ocr_page_images(&mut recognizer(), &images),
            Err(Error::EngineFailed { .. })
        ));
    }
}

//! PDFium access: open documents and pull positioned text spans

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::TextFragment;

/// Text layer of one page, in top-down page coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpans {
    /// 1-indexed
    pub page: usize,
    pub width: f64,
    pub height: f64,
    /// One fragment per PDFium text segment, no confidence
    pub spans: Vec<TextFragment>,
    /// PDFium's native page text
    pub raw_text: String,
}

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
pub(crate) fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Read a PDF file and check its header.
pub(crate) fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }
    let data = std::fs::read(path)?;
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(data)
}

pub(crate) fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::InvalidPdf {
                reason: "PDF is password protected".to_string(),
            }
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

fn page_spans(index: usize, page: &PdfPage) -> PageSpans {
    let width = page.width().value as f64;
    let height = page.height().value as f64;

    let text_obj = match page.text() {
        Ok(t) => t,
        Err(_) => {
            return PageSpans {
                page: index + 1,
                width,
                height,
                spans: Vec::new(),
                raw_text: String::new(),
            }
        }
    };

    // PDF y grows upwards; flip to image orientation
    let spans = text_obj
        .segments()
        .iter()
        .filter_map(|segment| {
            let text = segment.text();
            if text.trim().is_empty() {
                return None;
            }
            let bounds = segment.bounds();
            Some(TextFragment::from_rect(
                text,
                None,
                bounds.left().value as f64,
                height - bounds.top().value as f64,
                bounds.right().value as f64,
                height - bounds.bottom().value as f64,
            ))
        })
        .collect();

    PageSpans {
        page: index + 1,
        width,
        height,
        spans,
        raw_text: text_obj.all(),
    }
}

/// Extract the text layer of every page.
pub fn extract_pages(path: &Path) -> Result<Vec<PageSpans>> {
    let data = read_pdf(path)?;
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(&data, None)
        .map_err(map_pdfium_error)?;

    let pages: Vec<PageSpans> = document
        .pages()
        .iter()
        .enumerate()
        .map(|(index, page)| page_spans(index, &page))
        .collect();

    debug!(
        path = %path.display(),
        pages = pages.len(),
        spans = pages.iter().map(|p| p.spans.len()).sum::<usize>(),
        "Extracted PDF text layer"
    );
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_pdf() {
        let err = extract_pages(Path::new("/nonexistent/invoice.pdf")).unwrap_err();
        assert!(matches!(err, Error::PdfNotFound { .. }));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_rejects_non_pdf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 not a pdf").unwrap();
        let err = read_pdf(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidPdf { .. }));
    }
}

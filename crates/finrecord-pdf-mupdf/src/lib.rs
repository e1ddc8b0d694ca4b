use std::path::Path;

use mupdf::{Document, Page, Rect, TextPageFlags};

use finrecord_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the AGPL-licensed mupdf dependency from the rest of
/// the workspace.
///
/// Every page's text layer is read in block/line order. Pages whose text
/// layer is empty (scanned images, blank separators) come back as `None`.
/// Header and footer bands can optionally be dropped, which helps with
/// filings that stamp a running title or page counter on every page.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend {
    /// Fraction of page height from the top to drop as header (0.0-1.0).
    header_exclusion_ratio: Option<f32>,
    /// Fraction of page height from the bottom to drop as footer (0.0-1.0).
    footer_exclusion_ratio: Option<f32>,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Vertical band `(top, bottom)` whose blocks are kept.
    fn content_band(&self, bounds: &Rect) -> (Option<f32>, Option<f32>) {
        let height = bounds.y1 - bounds.y0;
        (
            self.header_exclusion_ratio.map(|r| bounds.y0 + height * r),
            self.footer_exclusion_ratio.map(|r| bounds.y1 - height * r),
        )
    }

    fn page_text(&self, page: &Page) -> Result<Option<String>, BackendError> {
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let bounds = page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let (top, bottom) = self.content_band(&bounds);

        let mut lines: Vec<String> = Vec::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();
            if top.is_some_and(|t| block_bounds.y1 <= t) {
                continue;
            }
            if bottom.is_some_and(|b| block_bounds.y0 >= b) {
                continue;
            }

            for line in block.lines() {
                lines.push(
                    line.chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect(),
                );
            }
        }

        // Lines are newline-separated with no trailing newline.
        let text = lines.join("\n");
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Option<String>>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document = Document::open(path_str)
            .map_err(|e| BackendError::OpenError(format!("{}: {}", path.display(), e)))?;

        let mut pages = Vec::new();
        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            pages.push(self.page_text(&page)?);
        }

        tracing::debug!(
            path = %path.display(),
            pages = pages.len(),
            empty = pages.iter().filter(|p| p.is_none()).count(),
            "extracted pdf pages"
        );
        Ok(pages)
    }
}

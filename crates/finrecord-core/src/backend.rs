use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors provide per-page text in physical page order; joining the
/// pages into a single document string is shared by all backends via
/// [`PdfBackend::extract_text`].
pub trait PdfBackend: Send + Sync {
    /// Extract the text of every page. `None` (or an empty string) marks a
    /// page with no extractable text layer.
    fn extract_pages(&self, path: &Path) -> Result<Vec<Option<String>>, BackendError>;

    /// Extract the full text content of a PDF file.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        Ok(join_pages(self.extract_pages(path)?))
    }
}

/// Concatenate page texts in order, each followed by a single newline.
///
/// Page text is kept byte-for-byte. Only pages that yield nothing (`None` or
/// `""`) are skipped, so a document with no pages or no text layer produces
/// an empty string.
pub fn join_pages<I>(pages: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut text = String::new();
    for page in pages.into_iter().flatten() {
        if page.is_empty() {
            continue;
        }
        text.push_str(&page);
        text.push('\n');
    }
    text
}

mod epub;
mod pdf;

pub use epub::EpubHandler;
pub use pdf::PdfHandler;

use crate::config::BookFormat;
use crate::error::Result;
use std::path::Path;

/// Metadata read from a book file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Title, empty when the file has none.
    pub title: String,
    /// First author, empty when the file has none.
    pub author: String,
}

/// Everything ingestion needs from a book file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Title and author.
    pub metadata: Metadata,
    /// Raw cover image bytes, if the book has one.
    pub cover: Option<Vec<u8>>,
    /// Whole plain-text body.
    pub text: String,
}

/// Page-addressable text of an opened book.
pub trait PageSource: Send {
    /// Number of pages.
    fn page_count(&self) -> u32;

    /// Plain text of the page at `index` (0-based).
    fn page_text(&self, index: u32) -> Result<String>;
}

/// Trait for format-specific book handlers.
pub trait FormatHandler: Send + Sync {
    /// Extract title and author from a book file.
    fn extract_metadata(&self, path: &Path) -> Result<Metadata>;

    /// Extract the raw cover image bytes.
    fn extract_cover(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Extract the whole plain-text body.
    fn extract_text(&self, path: &Path) -> Result<String>;

    /// Extract metadata, cover and text from a single parse of the file.
    fn extract(&self, path: &Path) -> Result<Extraction>;

    /// Open the book for page-by-page reading.
    fn open_pages(&self, path: &Path) -> Result<Box<dyn PageSource>>;
}

/// Get the appropriate handler for a book format.
pub fn get_handler(format: BookFormat) -> Box<dyn FormatHandler> {
    match format {
        BookFormat::Epub => Box::new(EpubHandler),
        BookFormat::Pdf => Box::new(PdfHandler),
    }
}

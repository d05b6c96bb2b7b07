//! Book record model.

use crate::config::BookFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A book stored in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Database identifier.
    pub id: i64,

    /// Path to the book file (unique within the library).
    pub path: PathBuf,

    /// Book title (may be empty when the file carries no metadata).
    pub title: String,

    /// Author (may be empty).
    pub author: String,

    /// Path to the cover thumbnail.
    pub thumbnail: PathBuf,

    /// Last-read page index.
    pub last_pos: i64,

    /// Time the book was added, as a UNIX timestamp.
    pub added_at: i64,
}

impl Book {
    /// Get the filename of the book.
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }

    /// Title to show, falling back to the file name.
    pub fn display_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            self.filename()
        } else {
            title
        }
    }

    /// Author to show.
    pub fn display_author(&self) -> &str {
        let author = self.author.trim();
        if author.is_empty() {
            "Unknown Author"
        } else {
            author
        }
    }

    /// File format, from the extension.
    pub fn format(&self) -> Option<BookFormat> {
        BookFormat::from_path(&self.path)
    }

    /// Whether the thumbnail file exists on disk.
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail.as_os_str().is_empty() && self.thumbnail.exists()
    }
}

mod schema;

pub use schema::Database;

use crate::library::book::Book;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Book record about to be inserted.
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    /// Absolute path to the book file.
    pub path: String,
    /// Extracted title (may be empty).
    pub title: String,
    /// Extracted author (may be empty).
    pub author: String,
    /// Path to the generated thumbnail.
    pub thumbnail: String,
}

/// Result of inserting a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row and full-text entry were created.
    Inserted(i64),
    /// A book with the same path already exists.
    Duplicate,
}

/// Full-text search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Matching book.
    pub book: Book,
    /// Excerpt around the match, terms wrapped in brackets.
    pub snippet: String,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Turn free-form user input into an FTS5 query.
///
/// Every whitespace-separated term is quoted, so operators and punctuation
/// typed by the user are matched literally instead of parsed.
pub fn fts_query(input: &str) -> Option<String> {
    let terms: Vec<String> = input
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

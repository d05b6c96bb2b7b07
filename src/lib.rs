//! book-reader: a local ebook library with folder watching.
//!
//! Books dropped into a watched folder are picked up automatically: their
//! metadata, cover and text are extracted and stored in a SQLite library
//! with a full-text index. The library can be browsed as a grid, searched,
//! and read page by page with optional text-to-speech.
//!
//! # Features
//!
//! - PDF and EPUB metadata, cover and text extraction
//! - Cover thumbnails, with generated covers for books without one
//! - Full-text search (SQLite FTS5)
//! - Folder watcher with a startup scan
//! - Terminal reader that remembers the last page
//! - Text-to-speech through an external synthesizer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Cover thumbnails.
pub mod covers;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Book format handlers.
pub mod formats;
/// Folder watching and ingestion.
pub mod ingest;
/// Library and book models.
pub mod library;
/// Page-by-page reader.
pub mod reader;
/// Text-to-speech playback.
pub mod tts;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use reader::Reader;

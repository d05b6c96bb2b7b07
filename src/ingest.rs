//! Folder ingestion: watch a directory, extract new books and store them.

use crate::config::{BookFormat, Config};
use crate::covers;
use crate::db::{Database, InsertOutcome, NewBook};
use crate::error::{AppError, Result};
use crate::formats;
use crate::library::book::Book;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rayon::prelude::*;
use std::fs::File;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// What happened to a file handed to the ingestor.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The book was extracted and stored.
    Added(Book),
    /// The path is already in the library.
    Duplicate,
    /// The extension is not a supported book format.
    Unsupported,
    /// The file did not become readable before the timeout.
    NotReady,
    /// The path is a directory.
    NotAFile,
}

/// Counters of a folder scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Books added.
    pub added: usize,
    /// Files already in the library.
    pub duplicates: usize,
    /// Unsupported, unready or non-file entries.
    pub skipped: usize,
    /// Files whose extraction or storage failed.
    pub failed: usize,
}

/// Wait until a file can be opened and its size has stopped changing.
///
/// Returns `Ok(false)` when `timeout` elapses first. A file that disappears
/// is an error.
pub fn wait_for_file(path: &Path, timeout: Duration, interval: Duration) -> Result<bool> {
    let start = Instant::now();
    let mut last_size: Option<u64> = None;

    loop {
        match File::open(path) {
            Ok(file) => {
                let size = file.metadata()?.len();
                if last_size == Some(size) {
                    return Ok(true);
                }
                last_size = Some(size);
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                last_size = None;
            }
            Err(e) => return Err(e.into()),
        }

        if start.elapsed() >= timeout {
            return Ok(false);
        }
        std::thread::sleep(interval);
    }
}

/// Book data pulled out of a file.
struct Extracted {
    cover: Option<Vec<u8>>,
    title: String,
    author: String,
    text: String,
}

/// Turns book files into library records.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    config: Arc<Config>,
}

impl Ingestor {
    /// Create an ingestor writing to `db`.
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Database the ingestor writes to.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Ingest one file.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        if path.is_dir() {
            return Ok(IngestOutcome::NotAFile);
        }

        let Some(format) = BookFormat::from_path(path) else {
            tracing::info!(path = %path.display(), "Ignoring unsupported file type");
            return Ok(IngestOutcome::Unsupported);
        };

        let watcher = &self.config.watcher;
        if !wait_for_file(path, watcher.ready_timeout(), watcher.poll_interval())? {
            tracing::warn!(path = %path.display(), "Timed out waiting for file to be ready");
            return Ok(IngestOutcome::NotReady);
        }

        let path = std::fs::canonicalize(path)?;
        let path_str = path.to_string_lossy().to_string();

        if self.db.contains_path(&path_str)? {
            tracing::info!(path = %path.display(), "Book already in library, skipping");
            return Ok(IngestOutcome::Duplicate);
        }

        let extracted = Self::extract(&path, format)?;
        let thumbnail = self.write_thumbnail(&path, format, &extracted)?;

        let new_book = NewBook {
            path: path_str,
            title: extracted.title,
            author: extracted.author,
            thumbnail: thumbnail.to_string_lossy().to_string(),
        };

        match self.db.insert_book(&new_book, &extracted.text)? {
            InsertOutcome::Inserted(id) => {
                let book = self
                    .db
                    .get_book(id)?
                    .ok_or_else(|| AppError::NotFound(id.to_string()))?;
                tracing::info!(
                    id,
                    title = %book.title,
                    author = %book.author,
                    chars = extracted.text.len(),
                    "Book added"
                );
                Ok(IngestOutcome::Added(book))
            }
            InsertOutcome::Duplicate => {
                tracing::info!(path = %path.display(), "Book already in library, skipping");
                Ok(IngestOutcome::Duplicate)
            }
        }
    }

    /// Run the format extractor for cover, metadata and text.
    fn extract(path: &Path, format: BookFormat) -> Result<Extracted> {
        let extraction = formats::get_handler(format).extract(path)?;

        Ok(Extracted {
            cover: extraction.cover,
            title: extraction.metadata.title,
            author: extraction.metadata.author,
            text: extraction.text,
        })
    }

    /// Save the cover thumbnail, generating one when the book has none.
    fn write_thumbnail(&self, path: &Path, format: BookFormat, extracted: &Extracted) -> Result<PathBuf> {
        let cache = &self.config.cache;
        let (width, height) = cache.cover_size(format);

        let png = match extracted
            .cover
            .as_deref()
            .map(|data| covers::make_thumbnail(data, width, height))
        {
            Some(Ok(png)) => png,
            other => {
                if let Some(Err(e)) = other {
                    tracing::debug!(path = %path.display(), error = %e, "Cover not decodable, using generated cover");
                }
                let label = if extracted.title.is_empty() {
                    path.file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default()
                } else {
                    extracted.title.clone()
                };
                covers::default_cover(&label, width, height)?
            }
        };

        std::fs::create_dir_all(&cache.thumbnails_dir)?;
        let thumb_path = covers::thumbnail_path(&cache.thumbnails_dir, path);
        std::fs::write(&thumb_path, png)?;
        tracing::debug!(thumbnail = %thumb_path.display(), "Thumbnail saved");

        Ok(thumb_path)
    }

    /// Ingest the files already present in `dir` (non-recursive).
    pub fn scan_dir(&self, dir: &Path) -> Result<ScanReport> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        tracing::info!(dir = %dir.display(), files = files.len(), "Scanning folder");

        let added = AtomicUsize::new(0);
        let duplicates = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.watcher.workers.max(1))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build worker pool: {}", e)))?;

        pool.install(|| {
            files.par_iter().for_each(|path| {
                let counter = match self.ingest_file(path) {
                    Ok(IngestOutcome::Added(_)) => &added,
                    Ok(IngestOutcome::Duplicate) => &duplicates,
                    Ok(_) => &skipped,
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Failed to ingest file");
                        &failed
                    }
                };
                counter.fetch_add(1, Ordering::Relaxed);
            });
        });

        let report = ScanReport {
            added: added.into_inner(),
            duplicates: duplicates.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
        };

        tracing::info!(
            added = report.added,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            "Scan complete"
        );

        Ok(report)
    }
}

/// Paths a filesystem event asks us to ingest.
pub fn event_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        // Rename within the folder: paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Watch `dir` and ingest new files until `shutdown` resolves.
pub async fn watch<F>(dir: &Path, ingestor: Arc<Ingestor>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    std::fs::create_dir_all(dir)?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let _ = tx.send(event);
        }
        Err(e) => tracing::warn!(error = %e, "Watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    tracing::info!(dir = %dir.display(), "Watching folder");

    tokio::pin!(shutdown);

    'events: loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Stopping watcher");
                break;
            }
            Some(event) = rx.recv() => {
                for path in event_paths(&event) {
                    tracing::info!(path = %path.display(), "Detected new file");

                    let worker = ingestor.clone();
                    let target = path.clone();
                    let task = tokio::task::spawn_blocking(move || worker.ingest_file(&target));

                    // The blocking task runs to completion on its own; only stop waiting for it.
                    tokio::select! {
                        _ = &mut shutdown => {
                            tracing::info!(path = %path.display(), "Stopping watcher during ingest");
                            break 'events;
                        }
                        joined = task => match joined {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => {
                                tracing::error!(path = %path.display(), error = %e, "Failed to ingest file");
                            }
                            Err(e) => {
                                tracing::error!(path = %path.display(), error = %e, "Ingest task failed");
                            }
                        },
                    }
                }
            }
            else => break,
        }
    }

    Ok(())
}

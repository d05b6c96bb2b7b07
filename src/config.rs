use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local ebook library with folder watching, search and a terminal reader.
#[derive(Parser, Debug, Clone)]
#[command(name = "book-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOK_READER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch the library folder and ingest new books (default if no command given).
    Watch {
        /// Folder to watch instead of the configured one.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Ingest the books already present in the library folder, then exit.
    Scan {
        /// Folder to scan instead of the configured one.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Ingest a single file.
    Import {
        /// Path to a PDF or EPUB file.
        file: PathBuf,
    },

    /// Show the library, newest first.
    List {
        /// Print records as JSON instead of a grid.
        #[arg(long)]
        json: bool,
    },

    /// Full-text search over the extracted book text.
    Search {
        /// Search terms.
        query: String,
        /// Maximum number of results.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Open a book in the terminal reader.
    Read {
        /// Book ID (see `list`).
        id: i64,
    },

    /// Create a default config file and initialize the database.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Library folder and view configuration.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Thumbnail cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Text-to-speech configuration.
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Folder watched for new books.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Number of columns in the library grid.
    #[serde(default = "default_grid_columns")]
    pub grid_columns: usize,

    /// Width of a grid tile, in characters.
    #[serde(default = "default_tile_width")]
    pub tile_width: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            grid_columns: default_grid_columns(),
            tile_width: default_tile_width(),
        }
    }
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("Library")
}

fn default_grid_columns() -> usize {
    2
}

fn default_tile_width() -> usize {
    36
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/library.db")
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for generated thumbnails.
    #[serde(default = "default_thumbnails_dir")]
    pub thumbnails_dir: PathBuf,

    /// PDF cover thumbnail bounding box width.
    #[serde(default = "default_pdf_cover_width")]
    pub pdf_cover_width: u32,

    /// PDF cover thumbnail bounding box height.
    #[serde(default = "default_pdf_cover_height")]
    pub pdf_cover_height: u32,

    /// EPUB cover thumbnail bounding box width.
    #[serde(default = "default_epub_cover_width")]
    pub epub_cover_width: u32,

    /// EPUB cover thumbnail bounding box height.
    #[serde(default = "default_epub_cover_height")]
    pub epub_cover_height: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            thumbnails_dir: default_thumbnails_dir(),
            pdf_cover_width: default_pdf_cover_width(),
            pdf_cover_height: default_pdf_cover_height(),
            epub_cover_width: default_epub_cover_width(),
            epub_cover_height: default_epub_cover_height(),
        }
    }
}

fn default_thumbnails_dir() -> PathBuf {
    PathBuf::from("data/thumbnails")
}

fn default_pdf_cover_width() -> u32 {
    200
}

fn default_pdf_cover_height() -> u32 {
    300
}

fn default_epub_cover_width() -> u32 {
    300
}

fn default_epub_cover_height() -> u32 {
    400
}

impl CacheConfig {
    /// Thumbnail bounding box for a format.
    pub fn cover_size(&self, format: BookFormat) -> (u32, u32) {
        match format {
            BookFormat::Pdf => (self.pdf_cover_width, self.pdf_cover_height),
            BookFormat::Epub => (self.epub_cover_width, self.epub_cover_height),
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How long to wait for a new file to become readable, in seconds.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Poll interval while waiting for a file, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Ingest files already in the folder when the watcher starts.
    #[serde(default = "default_scan_on_start")]
    pub scan_on_start: bool,

    /// Number of parallel workers for the startup scan (1 = sequential).
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout(),
            poll_interval_ms: default_poll_interval(),
            scan_on_start: default_scan_on_start(),
            workers: default_workers(),
        }
    }
}

impl WatcherConfig {
    /// Readiness timeout as a duration.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_ready_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    500
}

fn default_scan_on_start() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech synthesizer executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Voice name passed to the synthesizer.
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speed multiplier (1.0 = normal).
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Words per minute at speed 1.0.
    #[serde(default = "default_base_wpm")]
    pub base_words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            voice: default_voice(),
            speed: default_speed(),
            base_words_per_minute: default_base_wpm(),
        }
    }
}

fn default_program() -> String {
    "espeak-ng".to_string()
}

fn default_voice() -> String {
    "en-us".to_string()
}

fn default_speed() -> f32 {
    1.3
}

fn default_base_wpm() -> u32 {
    175
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("book-reader.toml"),
            dirs::config_dir()
                .map(|p| p.join("book-reader").join("config.toml"))
                .unwrap_or_default(),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# book-reader configuration

[library]
# Books dropped into this folder are ingested automatically
watch_dir = "Library"
grid_columns = 2
tile_width = 36

[database]
path = "data/library.db"

[cache]
thumbnails_dir = "data/thumbnails"
pdf_cover_width = 200
pdf_cover_height = 300
epub_cover_width = 300
epub_cover_height = 400

[watcher]
# Seconds to wait for a copied file to become readable
ready_timeout_secs = 10
poll_interval_ms = 500
# Ingest files already in the folder when `watch` starts
scan_on_start = true
workers = 1

[speech]
program = "espeak-ng"
voice = "en-us"
speed = 1.3
base_words_per_minute = 175
"#
        .to_string()
    }
}

/// Supported book formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookFormat {
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
}

impl BookFormat {
    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            _ => None,
        }
    }

    /// Try to detect format from a file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

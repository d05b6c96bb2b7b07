//! book-reader entry point.

use book_reader::{
    config::{Cli, Command, Config},
    db::{Database, timestamp_to_datetime},
    ingest::{self, IngestOutcome, Ingestor},
    library::LibraryView,
    reader::{self, Reader},
    tts::TtsPlayer,
};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so the reader and listings stay clean)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_reader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Watch { dir }) => cmd_watch(config, dir).await,
        Some(Command::Scan { dir }) => cmd_scan(config, dir),
        Some(Command::Import { file }) => cmd_import(config, file),
        Some(Command::List { json }) => cmd_list(&config, json),
        Some(Command::Search { query, limit }) => cmd_search(&config, &query, limit),
        Some(Command::Read { id }) => cmd_read(&config, id),
        None => cmd_watch(config, None).await,
    }
}

/// Initialize config, database and library folder.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    std::fs::create_dir_all(&config.library.watch_dir)?;
    println!("Created library folder: {}", config.library.watch_dir.display());

    println!("\nRun: book-reader watch");
    println!("Then drop PDF or EPUB files into the library folder.");

    Ok(())
}

fn open_ingestor(config: Config) -> anyhow::Result<Arc<Ingestor>> {
    let db = Database::open(&config.database.path)?;
    Ok(Arc::new(Ingestor::new(db, Arc::new(config))))
}

/// Watch the library folder until Ctrl-C.
async fn cmd_watch(config: Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.library.watch_dir.clone());
    let scan_on_start = config.watcher.scan_on_start;
    let ingestor = open_ingestor(config)?;

    tracing::info!(dir = %dir.display(), "Starting book-reader watcher");

    if scan_on_start && dir.is_dir() {
        let scanner = ingestor.clone();
        let scan_dir = dir.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = scanner.scan_dir(&scan_dir) {
                tracing::error!(error = %e, "Startup scan failed");
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    ingest::watch(&dir, ingestor, shutdown).await?;
    Ok(())
}

/// Ingest the files already in the folder.
fn cmd_scan(config: Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.library.watch_dir.clone());
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let ingestor = open_ingestor(config)?;
    let report = ingestor.scan_dir(&dir)?;

    println!(
        "Added {}, already present {}, skipped {}, failed {}",
        report.added, report.duplicates, report.skipped, report.failed
    );
    Ok(())
}

/// Ingest one file.
fn cmd_import(config: Config, file: PathBuf) -> anyhow::Result<()> {
    let ingestor = open_ingestor(config)?;

    match ingestor.ingest_file(&file)? {
        IngestOutcome::Added(book) => println!(
            "Added #{}: {} by {}",
            book.id,
            book.display_title(),
            book.display_author()
        ),
        IngestOutcome::Duplicate => println!("Already in library: {}", file.display()),
        IngestOutcome::Unsupported => println!("Unsupported file type: {}", file.display()),
        IngestOutcome::NotReady => println!("File not ready: {}", file.display()),
        IngestOutcome::NotAFile => println!("Not a file: {}", file.display()),
    }
    Ok(())
}

/// Print the library grid.
fn cmd_list(config: &Config, json: bool) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let view = LibraryView::load(&db)?;

    if json {
        println!("{}", serde_json::to_string_pretty(view.books())?);
        return Ok(());
    }

    if view.is_empty() {
        println!(
            "No books yet. Drop PDF or EPUB files into {}",
            config.library.watch_dir.display()
        );
        return Ok(());
    }

    print!(
        "{}",
        view.render(config.library.grid_columns, config.library.tile_width)
    );
    Ok(())
}

/// Print full-text search results.
fn cmd_search(config: &Config, query: &str, limit: usize) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let hits = db.search(query, limit)?;

    if hits.is_empty() {
        println!("No matches for: {}", query);
        return Ok(());
    }

    for hit in hits {
        let added = timestamp_to_datetime(hit.book.added_at).format("%Y-%m-%d");
        println!(
            "#{:<5} {} by {} (added {})",
            hit.book.id,
            hit.book.display_title(),
            hit.book.display_author(),
            added
        );
        println!("       {}", hit.snippet.replace('\n', " "));
    }
    Ok(())
}

/// Open a book in the terminal reader.
fn cmd_read(config: &Config, id: i64) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let Some(book) = db.get_book(id)? else {
        anyhow::bail!("No book with id {}", id);
    };

    let tts = TtsPlayer::from_config(&config.speech);
    let mut reader = Reader::open(db, book, tts)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    reader::run_interactive(&mut reader, stdin.lock(), stdout.lock())?;
    Ok(())
}

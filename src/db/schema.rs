use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BOOK_COLUMNS: &str = "id, path, title, author, thumbnail, last_pos, added_at";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                thumbnail TEXT NOT NULL DEFAULT '',
                last_pos INTEGER NOT NULL DEFAULT 0,
                added_at INTEGER NOT NULL
            );

            -- Full-text index over extracted book text, rowid = books.id
            CREATE VIRTUAL TABLE IF NOT EXISTS book_fts
                USING fts5(content, book_id UNINDEXED);

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_added ON books(added_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    fn row_to_book(row: &Row<'_>) -> rusqlite::Result<Book> {
        let path: String = row.get(1)?;
        let thumbnail: String = row.get(4)?;
        Ok(Book {
            id: row.get(0)?,
            path: PathBuf::from(path),
            title: row.get(2)?,
            author: row.get(3)?,
            thumbnail: PathBuf::from(thumbnail),
            last_pos: row.get(5)?,
            added_at: row.get(6)?,
        })
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book and its full-text entry in one transaction.
    ///
    /// A path that is already in the library yields `InsertOutcome::Duplicate`
    /// and leaves the database untouched.
    pub fn insert_book(&self, book: &NewBook, text: &str) -> Result<InsertOutcome> {
        self.insert_book_at(book, text, now_timestamp())
    }

    /// Insert a book with an explicit `added_at` timestamp.
    pub fn insert_book_at(&self, book: &NewBook, text: &str, added_at: i64) -> Result<InsertOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO books (path, title, author, thumbnail, last_pos, added_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![book.path, book.title, book.author, book.thumbnail, added_at],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Ok(InsertOutcome::Duplicate);
            }
            Err(e) => return Err(AppError::Internal(format!("Failed to insert book: {}", e))),
        }

        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO book_fts (rowid, content, book_id) VALUES (?1, ?2, ?1)",
            params![id, text],
        )
        .map_err(|e| AppError::Internal(format!("Failed to index book text: {}", e)))?;

        tx.commit()?;
        Ok(InsertOutcome::Inserted(id))
    }

    /// Check whether a path is already in the library.
    pub fn contains_path(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM books WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to look up path: {}", e)))?;
        Ok(found.is_some())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Get book by file path.
    pub fn get_book_by_path(&self, path: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE path = ?1", BOOK_COLUMNS),
            params![path],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List all books, most recently added first.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books ORDER BY added_at DESC, id DESC",
                BOOK_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Count books.
    pub fn book_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))?;
        Ok(count as usize)
    }

    /// Persist the last-read position of a book.
    pub fn update_last_pos(&self, id: i64, pos: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET last_pos = ?1 WHERE id = ?2",
                params![pos, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update position: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SEARCH OPERATIONS ==========

    /// Full-text search over extracted book text, best matches first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT b.id, b.path, b.title, b.author, b.thumbnail, b.last_pos, b.added_at,
                        snippet(book_fts, 0, '[', ']', '...', 12)
                 FROM book_fts
                 JOIN books b ON b.id = book_fts.rowid
                 WHERE book_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let hits = stmt
            .query_map(params![fts, limit as i64], |row| {
                Ok(SearchHit {
                    book: Self::row_to_book(row)?,
                    snippet: row.get(7)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to search: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect results: {}", e)))?;

        Ok(hits)
    }

    /// Number of full-text entries owned by a book.
    pub fn fts_entry_count(&self, id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM book_fts WHERE book_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count index entries: {}", e)))?;
        Ok(count as usize)
    }
}

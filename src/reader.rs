//! Page-by-page reader with text-to-speech.

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::formats::{self, PageSource};
use crate::library::book::Book;
use crate::tts::TtsPlayer;
use std::io::{BufRead, Write};

/// Speech state after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// Nothing is being read aloud.
    Idle,
    /// The current page is being read aloud.
    Playing,
}

/// An open book.
pub struct Reader {
    db: Database,
    book: Book,
    pages: Box<dyn PageSource>,
    current_page: u32,
    tts: TtsPlayer,
}

impl Reader {
    /// Open a book, resuming at its last-read page.
    pub fn open(db: Database, book: Book, tts: TtsPlayer) -> Result<Self> {
        let format = book
            .format()
            .ok_or_else(|| AppError::InvalidFormat(book.path.display().to_string()))?;
        let pages = formats::get_handler(format).open_pages(&book.path)?;

        let count = pages.page_count();
        let current_page = if count == 0 {
            0
        } else {
            (book.last_pos.max(0) as u32).min(count - 1)
        };

        tracing::debug!(id = book.id, pages = count, page = current_page, "Opened book");

        Ok(Self {
            db,
            book,
            pages,
            current_page,
            tts,
        })
    }

    /// The book being read.
    pub fn book(&self) -> &Book {
        &self.book
    }

    /// Number of pages.
    pub fn page_count(&self) -> u32 {
        self.pages.page_count()
    }

    /// Current page index.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Whether the current page is being read aloud.
    pub fn is_playing(&self) -> bool {
        self.tts.is_speaking()
    }

    /// Go to page `index`, stopping speech and remembering the position.
    pub fn show_page(&mut self, index: u32) -> Result<String> {
        if index >= self.page_count() {
            return Err(AppError::NotFound(format!("page {}", index + 1)));
        }

        if self.tts.is_speaking() {
            self.tts.stop();
        }

        let text = self.pages.page_text(index)?;
        self.current_page = index;

        self.db.update_last_pos(self.book.id, index as i64)?;
        self.book.last_pos = index as i64;

        Ok(text)
    }

    /// Text of the current page.
    pub fn current_text(&self) -> Result<String> {
        self.pages.page_text(self.current_page)
    }

    /// Move to the next page; `None` on the last page.
    pub fn next_page(&mut self) -> Result<Option<String>> {
        if self.current_page + 1 < self.page_count() {
            self.show_page(self.current_page + 1).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Move to the previous page; `None` on the first page.
    pub fn prev_page(&mut self) -> Result<Option<String>> {
        if self.current_page > 0 && self.page_count() > 0 {
            self.show_page(self.current_page - 1).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Start reading the current page aloud, or stop if already reading.
    pub fn toggle_play(&mut self) -> Result<PlayState> {
        if self.tts.is_speaking() {
            self.tts.stop();
            return Ok(PlayState::Idle);
        }

        let text = self.current_text()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(PlayState::Idle);
        }

        self.tts.speak(text);
        Ok(PlayState::Playing)
    }

    /// Stop speech before the reader goes away.
    pub fn close(&mut self) {
        self.tts.stop();
    }
}

const HELP: &str = "Commands: n next, p previous, g <page> go to page, l listen/stop, q quit";

/// Drive a reader from line-oriented commands.
pub fn run_interactive<R: BufRead, W: Write>(
    reader: &mut Reader,
    input: R,
    mut out: W,
) -> Result<()> {
    writeln!(
        out,
        "{} by {} ({} pages)",
        reader.book().display_title(),
        reader.book().display_author(),
        reader.page_count()
    )?;
    writeln!(out, "{}", HELP)?;

    if reader.page_count() == 0 {
        writeln!(out, "This book has no readable pages.")?;
        return Ok(());
    }

    let text = reader.show_page(reader.current_page())?;
    print_page(reader, &text, &mut out)?;

    for line in input.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("n") {
            "n" => match reader.next_page()? {
                Some(text) => print_page(reader, &text, &mut out)?,
                None => writeln!(out, "(last page)")?,
            },
            "p" => match reader.prev_page()? {
                Some(text) => print_page(reader, &text, &mut out)?,
                None => writeln!(out, "(first page)")?,
            },
            "g" => {
                let target = parts.next().and_then(|p| p.parse::<u32>().ok());
                match target {
                    Some(page) if page >= 1 && page <= reader.page_count() => {
                        let text = reader.show_page(page - 1)?;
                        print_page(reader, &text, &mut out)?;
                    }
                    _ => writeln!(out, "Page must be between 1 and {}", reader.page_count())?,
                }
            }
            "l" => match reader.toggle_play()? {
                PlayState::Playing => writeln!(out, "Listening... (l to stop)")?,
                PlayState::Idle => writeln!(out, "Stopped.")?,
            },
            "q" => break,
            "h" | "?" => writeln!(out, "{}", HELP)?,
            other => writeln!(out, "Unknown command: {}", other)?,
        }
        out.flush()?;
    }

    reader.close();
    Ok(())
}

fn print_page<W: Write>(reader: &Reader, text: &str, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "--- Page {}/{} ---",
        reader.current_page() + 1,
        reader.page_count()
    )?;
    let text = text.trim();
    if text.is_empty() {
        writeln!(out, "(no text on this page)")?;
    } else {
        writeln!(out, "{}", text)?;
    }
    Ok(())
}

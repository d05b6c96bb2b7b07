//! Library grid view.

use crate::db::Database;
use crate::error::Result;
use crate::library::book::Book;

/// A book placed in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile<'a> {
    /// Grid row.
    pub row: usize,
    /// Grid column.
    pub col: usize,
    /// Book shown in the tile.
    pub book: &'a Book,
}

/// Books of the library, newest first.
#[derive(Debug, Clone, Default)]
pub struct LibraryView {
    books: Vec<Book>,
}

impl LibraryView {
    /// Load every book from the database.
    pub fn load(db: &Database) -> Result<Self> {
        Ok(Self {
            books: db.list_books()?,
        })
    }

    /// Build a view from an already ordered list.
    pub fn from_books(books: Vec<Book>) -> Self {
        Self { books }
    }

    /// Books in display order.
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Lay the books out on a grid, filling rows left to right.
    pub fn tiles(&self, columns: usize) -> Vec<Tile<'_>> {
        let columns = columns.max(1);
        self.books
            .iter()
            .enumerate()
            .map(|(idx, book)| Tile {
                row: idx / columns,
                col: idx % columns,
                book,
            })
            .collect()
    }

    /// Render the grid as text, each tile `width` characters wide.
    pub fn render(&self, columns: usize, width: usize) -> String {
        let width = width.max(8);
        let tiles = self.tiles(columns);
        let mut out = String::new();

        for row in tiles.chunk_by(|a, b| a.row == b.row) {
            render_row(row, width, &mut out);
        }

        out
    }
}

/// Three text lines for one grid row, then a blank line.
fn render_row(row: &[Tile<'_>], width: usize, out: &mut String) {
    let heading: Vec<String> = row
        .iter()
        .map(|t| fit(&format!("#{} {}", t.book.id, t.book.display_title()), width))
        .collect();
    let author: Vec<String> = row
        .iter()
        .map(|t| fit(&format!("   {}", t.book.display_author()), width))
        .collect();
    let cover: Vec<String> = row
        .iter()
        .map(|t| {
            let marker = if t.book.has_thumbnail() { "cover" } else { "no cover" };
            fit(&format!("   [{}] page {}", marker, t.book.last_pos + 1), width)
        })
        .collect();

    for line in [heading, author, cover] {
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out.push('\n');
}

/// Pad or truncate to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{:<width$}", text, width = width)
    } else {
        let mut cut: String = text.chars().take(width - 3).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn book(id: i64, title: &str) -> Book {
        Book {
            id,
            path: PathBuf::from(format!("/books/{}.pdf", id)),
            title: title.to_string(),
            author: String::new(),
            thumbnail: PathBuf::new(),
            last_pos: 0,
            added_at: 0,
        }
    }

    #[test]
    fn test_tiles_fill_rows() {
        let view = LibraryView::from_books((1..=5).map(|i| book(i, "T")).collect());
        let places: Vec<(usize, usize)> = view.tiles(2).iter().map(|t| (t.row, t.col)).collect();
        assert_eq!(places, vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn test_zero_columns_is_single_column() {
        let view = LibraryView::from_books(vec![book(1, "A"), book(2, "B")]);
        let places: Vec<(usize, usize)> = view.tiles(0).iter().map(|t| (t.row, t.col)).collect();
        assert_eq!(places, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_render_rows_follow_tiles() {
        let view = LibraryView::from_books((1..=5).map(|i| book(i, &format!("Book {}", i))).collect());
        let text = view.render(2, 20);

        let headings: Vec<&str> = text.lines().filter(|l| l.starts_with('#')).collect();
        assert_eq!(headings.len(), 3);
        assert!(headings[0].contains("#1 Book 1") && headings[0].contains("#2 Book 2"));
        assert!(headings[1].contains("#3 Book 3") && headings[1].contains("#4 Book 4"));
        assert_eq!(headings[2], "#5 Book 5");

        assert_eq!(LibraryView::default().render(2, 20), "");
    }

    #[test]
    fn test_render_falls_back_to_filename() {
        let view = LibraryView::from_books(vec![book(7, "  ")]);
        let text = view.render(2, 30);
        assert!(text.contains("#7 7.pdf"));
        assert!(text.contains("Unknown Author"));
    }

    #[test]
    fn test_fit_truncates_long_titles() {
        assert_eq!(fit("abcdefghij", 8), "abcde...");
        assert_eq!(fit("abc", 5), "abc  ");
    }
}

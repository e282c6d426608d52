//! Book metadata, conversation history and stored summaries.
//!
//! The catalog is the only place that knows which collection belongs to
//! which book. Timestamps are Unix seconds.

use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::{RagError, Result};
use crate::models::{Book, ChatTurn, NewBook, Summary};

/// Library-wide totals shown by `bookrag stats`.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub books: i64,
    pub pages: i64,
    pub total_chars: i64,
    pub chat_turns: i64,
    pub summaries: i64,
    /// Largest books by character count, biggest first.
    pub largest: Vec<Book>,
}

/// Listing order for [`Catalog::list_books`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookSort {
    /// Most recently accessed first.
    #[default]
    Recent,
    /// Title, A to Z (case-insensitive).
    Name,
    /// Largest character count first.
    Size,
    /// Newest upload first.
    Date,
}

impl BookSort {
    fn order_by(self) -> &'static str {
        match self {
            BookSort::Recent => "last_accessed DESC",
            BookSort::Name => "title COLLATE NOCASE ASC",
            BookSort::Size => "total_chars DESC",
            BookSort::Date => "created_at DESC",
        }
    }
}

impl FromStr for BookSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" => Ok(BookSort::Recent),
            "name" => Ok(BookSort::Name),
            "size" => Ok(BookSort::Size),
            "date" => Ok(BookSort::Date),
            other => Err(format!(
                "unknown sort '{}' (expected recent, name, size or date)",
                other
            )),
        }
    }
}

/// Filter and order for a library listing.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    /// Case-insensitive substring matched against title or filename.
    pub search: Option<String>,
    pub sort: BookSort,
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

const BOOK_COLUMNS: &str =
    "id, title, filename, file_path, collection_name, pages, total_chars, created_at, last_accessed";

fn book_from_row(row: &SqliteRow) -> Book {
    Book {
        id: row.get("id"),
        title: row.get("title"),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        collection_name: row.get("collection_name"),
        pages: row.get("pages"),
        total_chars: row.get("total_chars"),
        created_at: row.get("created_at"),
        last_accessed: row.get("last_accessed"),
    }
}

fn turn_from_row(row: &SqliteRow) -> ChatTurn {
    let id: i64 = row.get("id");
    let sources_json: String = row.get("sources_json");
    // A damaged sources column should not hide the rest of the history.
    let sources = serde_json::from_str(&sources_json).unwrap_or_else(|e| {
        warn!(turn_id = id, error = %e, "unreadable sources for chat turn; showing none");
        Vec::new()
    });
    ChatTurn {
        id,
        book_id: row.get("book_id"),
        question: row.get("question"),
        answer: row.get("answer"),
        sources,
        asked_at: row.get("asked_at"),
    }
}

fn summary_from_row(row: &SqliteRow) -> Summary {
    Summary {
        id: row.get("id"),
        book_id: row.get("book_id"),
        text: row.get("text"),
        generated_at: row.get("generated_at"),
    }
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_book(&self, book: &NewBook) -> Result<i64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO books (title, filename, file_path, collection_name, pages,
                               total_chars, created_at, last_accessed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.title)
        .bind(&book.filename)
        .bind(&book.file_path)
        .bind(&book.collection_name)
        .bind(book.pages)
        .bind(book.total_chars)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(book_from_row))
    }

    /// Like [`get_book`](Self::get_book) but a missing record is `BookNotFound`.
    pub async fn require_book(&self, id: i64) -> Result<Book> {
        self.get_book(id).await?.ok_or(RagError::BookNotFound { id })
    }

    /// Books matching `query`, in the requested order. Ties fall back to id
    /// descending so the listing is stable.
    pub async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let filter = if search.is_some() {
            "WHERE lower(title) LIKE ? ESCAPE '\\' OR lower(filename) LIKE ? ESCAPE '\\'"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM books {} ORDER BY {}, id DESC",
            BOOK_COLUMNS,
            filter,
            query.sort.order_by()
        );

        let mut q = sqlx::query(&sql);
        if let Some(term) = search {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            q = q.bind(pattern.clone()).bind(pattern);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(book_from_row).collect())
    }

    pub async fn touch(&self, id: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("UPDATE books SET last_accessed = MAX(last_accessed, ?) WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RagError::BookNotFound { id });
        }
        Ok(())
    }

    pub async fn add_turn(
        &self,
        book_id: i64,
        question: &str,
        answer: &str,
        pages: &[u32],
    ) -> Result<i64> {
        let sources_json = serde_json::to_string(pages)
            .map_err(|e| RagError::InvalidInput(format!("cannot encode sources: {}", e)))?;
        let result = sqlx::query(
            "INSERT INTO chat_turns (book_id, question, answer, sources_json, asked_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(book_id)
        .bind(question)
        .bind(answer)
        .bind(sources_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// The most recent `limit` turns for a book, oldest first.
    pub async fn list_turns(&self, book_id: i64, limit: usize) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, book_id, question, answer, sources_json, asked_at FROM (
                SELECT * FROM chat_turns WHERE book_id = ? ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(book_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(turn_from_row).collect())
    }

    pub async fn add_summary(&self, book_id: i64, text: &str) -> Result<Summary> {
        let generated_at = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO summaries (book_id, text, generated_at) VALUES (?, ?, ?)",
        )
        .bind(book_id)
        .bind(text)
        .bind(generated_at)
        .execute(&self.pool)
        .await?;
        Ok(Summary {
            id: result.last_insert_rowid(),
            book_id,
            text: text.to_string(),
            generated_at,
        })
    }

    pub async fn latest_summary(&self, book_id: i64) -> Result<Option<Summary>> {
        let row = sqlx::query(
            "SELECT id, book_id, text, generated_at FROM summaries WHERE book_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(summary_from_row))
    }

    /// Delete a book with its turns and summaries in one transaction.
    ///
    /// Returns the deleted record so the caller can drop the collection and
    /// the stored file.
    pub async fn delete_book(&self, id: i64) -> Result<Book> {
        let book = self.require_book(id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chat_turns WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM summaries WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(book)
    }

    pub async fn count_books(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn stats(&self, largest: usize) -> Result<LibraryStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS books,
                   COALESCE(SUM(pages), 0) AS pages,
                   COALESCE(SUM(total_chars), 0) AS total_chars
            FROM books
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let chat_turns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_turns")
            .fetch_one(&self.pool)
            .await?;
        let summaries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summaries")
            .fetch_one(&self.pool)
            .await?;

        let largest_rows = sqlx::query(&format!(
            "SELECT {} FROM books ORDER BY total_chars DESC, id ASC LIMIT ?",
            BOOK_COLUMNS
        ))
        .bind(largest as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(LibraryStats {
            books: row.get("books"),
            pages: row.get("pages"),
            total_chars: row.get("total_chars"),
            chat_turns,
            summaries,
            largest: largest_rows.iter().map(book_from_row).collect(),
        })
    }
}

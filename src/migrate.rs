//! Schema creation. Every statement is idempotent, so `init` may run
//! against an existing database.

use sqlx::SqlitePool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        dims INTEGER NOT NULL,
        metric TEXT NOT NULL,
        record_count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS index_records (
        collection TEXT NOT NULL,
        seq INTEGER NOT NULL,
        page INTEGER NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        PRIMARY KEY (collection, seq),
        FOREIGN KEY (collection) REFERENCES collections(name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        filename TEXT NOT NULL,
        file_path TEXT NOT NULL,
        collection_name TEXT NOT NULL UNIQUE,
        pages INTEGER NOT NULL,
        total_chars INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        last_accessed INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_turns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        sources_json TEXT NOT NULL DEFAULT '[]',
        asked_at INTEGER NOT NULL,
        FOREIGN KEY (book_id) REFERENCES books(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        generated_at INTEGER NOT NULL,
        FOREIGN KEY (book_id) REFERENCES books(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_turns_book ON chat_turns(book_id, id)",
    "CREATE INDEX IF NOT EXISTS idx_summaries_book ON summaries(book_id, id)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

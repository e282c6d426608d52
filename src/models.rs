//! Core data models used throughout the pipeline.
//!
//! Pages and chunks flow through ingestion; retrieved chunks flow through
//! answering and summarization; books, chat turns and summaries are the
//! records kept by the [`catalog`](crate::catalog).

use serde::Serialize;

/// One page of extracted text. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A window of one page's text. Offsets are in characters, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub page: u32,
    pub index_in_page: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A chunk paired with its embedding, ready to be written to a collection.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub page: u32,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A record returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub seq: i64,
    pub page: u32,
    pub text: String,
    pub score: f32,
}

/// A generated answer and the pages its context came from.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<u32>,
}

/// Fields supplied when registering a new book.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub filename: String,
    pub file_path: String,
    pub collection_name: String,
    pub pages: i64,
    pub total_chars: i64,
}

/// A book record in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub file_path: String,
    pub collection_name: String,
    pub pages: i64,
    pub total_chars: i64,
    pub created_at: i64,
    pub last_accessed: i64,
}

/// One question/answer exchange about a book.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub id: i64,
    pub book_id: i64,
    pub question: String,
    pub answer: String,
    pub sources: Vec<u32>,
    pub asked_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub id: i64,
    pub book_id: i64,
    pub text: String,
    pub generated_at: i64,
}

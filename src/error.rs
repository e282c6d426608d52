//! Typed failures for the ingestion and retrieval pipeline.
//!
//! Every failure the core can produce is a [`RagError`] variant. Callers get
//! the typed value back and decide how to present it; [`RagError::user_message`]
//! gives the operator-facing wording used by the CLI, which keeps ingestion
//! problems distinguishable from model-availability problems.

use thiserror::Error;

/// Errors produced by the book RAG pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// The extractor produced no page with usable text.
    #[error("no extractable text in {source_name}")]
    ExtractionEmpty { source_name: String },

    /// The embedding service could not produce vectors.
    #[error("embedding service unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    /// A build for this collection is already running.
    #[error("a build is already in progress for collection {collection}")]
    BuildConflict { collection: String },

    /// The collection is being built and cannot be read yet.
    #[error("collection {collection} is being built and is not ready for queries")]
    IndexNotReady { collection: String },

    /// No backing store exists for the collection.
    #[error("collection not found: {collection}")]
    CollectionNotFound { collection: String },

    /// The collection was built with a different embedding space.
    #[error(
        "collection {collection} was built with {actual}, but the configured embedding space is {expected}"
    )]
    DimensionMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    /// Retrieval returned nothing to ground an answer on.
    #[error("no indexed content available for collection {collection}")]
    EmptyContext { collection: String },

    /// The language model call failed or returned nothing.
    #[error("generation service unavailable: {message}")]
    GenerationUnavailable { message: String },

    #[error("book not found: {id}")]
    BookNotFound { id: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn embedding(message: impl Into<String>) -> Self {
        RagError::EmbeddingUnavailable {
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        RagError::GenerationUnavailable {
            message: message.into(),
        }
    }

    /// Operator-facing message for this failure kind.
    pub fn user_message(&self) -> String {
        match self {
            RagError::ExtractionEmpty { source_name } => format!(
                "No extractable text found in {}. Is it a scanned document without a text layer?",
                source_name
            ),
            RagError::EmbeddingUnavailable { message } => format!(
                "Embedding service unavailable ({}). Nothing was stored; check the [embedding] settings and retry.",
                message
            ),
            RagError::BuildConflict { .. } => {
                "This book is already being processed. Retry once the current ingestion finishes."
                    .to_string()
            }
            RagError::IndexNotReady { .. } => {
                "This book is still being processed. Try again when ingestion completes.".to_string()
            }
            RagError::CollectionNotFound { .. } => {
                "Could not load book data. Please re-ingest the book.".to_string()
            }
            RagError::DimensionMismatch { expected, actual, .. } => format!(
                "This book was indexed with {} but the current embedding setup is {}. Re-ingest it or restore the previous [embedding] settings.",
                actual, expected
            ),
            RagError::EmptyContext { .. } => {
                "This book has no processed content. Please re-ingest the book.".to_string()
            }
            RagError::GenerationUnavailable { message } => format!(
                "Generation service unavailable ({}). Is the language model running?",
                message
            ),
            RagError::BookNotFound { id } => format!("Book not found: {}", id),
            RagError::InvalidInput(msg) => msg.clone(),
            RagError::Storage(e) => format!("Database error: {}", e),
            RagError::Io(e) => format!("File error: {}", e),
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_and_model_failures_have_distinct_messages() {
        let empty = RagError::EmptyContext {
            collection: "book_x".into(),
        };
        let gen = RagError::generation("connection refused");
        let emb = RagError::embedding("connection refused");
        assert!(empty.user_message().contains("no processed content"));
        assert!(gen.user_message().contains("Generation service unavailable"));
        assert!(emb.user_message().contains("Embedding service unavailable"));
        assert_ne!(empty.user_message(), gen.user_message());
        assert_ne!(gen.user_message(), emb.user_message());
    }

    #[test]
    fn test_not_found_differs_from_empty() {
        let missing = RagError::CollectionNotFound {
            collection: "book_x".into(),
        };
        let empty = RagError::EmptyContext {
            collection: "book_x".into(),
        };
        assert_ne!(missing.to_string(), empty.to_string());
        assert_ne!(missing.user_message(), empty.user_message());
    }
}

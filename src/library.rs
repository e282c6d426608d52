//! The book library: catalog, index and models wired together.
//!
//! [`Library`] is the entry point used by the CLI and the integration
//! tests. Every operation takes the book id explicitly; there is no
//! "current book" state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::answer::AnswerSynthesizer;
use crate::catalog::{BookQuery, Catalog, LibraryStats};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extract::{extract_pages, source_name};
use crate::generation::{create_model, LanguageModel};
use crate::index::{CollectionHandle, CorpusIndex, IndexSettings, SqliteIndex};
use crate::ingest::{new_collection_name, BuildReport, IngestPipeline};
use crate::migrate::run_migrations;
use crate::models::{Answer, Book, ChatTurn, NewBook, RetrievedChunk, Summary};
use crate::retrieve::Retriever;
use crate::summarize::Summarizer;

/// Result of ingesting one file.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub book: Book,
    pub report: BuildReport,
    /// The automatic summary, when one was requested and generation succeeded.
    pub summary: Option<String>,
}

pub struct Library {
    config: Config,
    catalog: Catalog,
    index: Arc<dyn CorpusIndex>,
    pipeline: IngestPipeline,
    retriever: Retriever,
    answerer: AnswerSynthesizer,
    summarizer: Summarizer,
}

impl Library {
    /// Open the library described by `config`, creating the schema if needed.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        run_migrations(&pool).await?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let model: Arc<dyn LanguageModel> = Arc::from(create_model(&config.generation)?);
        let index: Arc<dyn CorpusIndex> = Arc::new(SqliteIndex::new(
            pool.clone(),
            IndexSettings::from_config(config),
        ));

        Ok(Self::with_components(config.clone(), pool, index, embedder, model))
    }

    /// Assemble a library from explicit parts. The pool must already be migrated.
    pub fn with_components(
        config: Config,
        pool: SqlitePool,
        index: Arc<dyn CorpusIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), index.clone());
        let pipeline = IngestPipeline::new(
            embedder,
            index.clone(),
            config.chunking.clone(),
            config.embedding.batch_size,
        );
        let answerer = AnswerSynthesizer::new(
            retriever.clone(),
            model.clone(),
            config.retrieval.qa_k,
            config.generation.max_context_chars,
        );
        let summarizer = Summarizer::new(
            retriever.clone(),
            model,
            config.retrieval.summary_k,
            config.generation.max_context_chars,
        );

        Self {
            config,
            catalog: Catalog::new(pool),
            index,
            pipeline,
            retriever,
            answerer,
            summarizer,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn index(&self) -> &Arc<dyn CorpusIndex> {
        &self.index
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    /// Extract, index and register a document, then optionally summarize it.
    ///
    /// The book record is only created once its collection is fully built.
    /// A failed automatic summary is logged and does not fail the ingestion.
    pub async fn ingest_file(
        &self,
        path: &Path,
        title: Option<&str>,
        auto_summary: bool,
    ) -> Result<IngestOutcome> {
        let filename = source_name(path);
        let pages = extract_pages(path)?;

        let collection_name = new_collection_name();
        let report = self.pipeline.ingest(&collection_name, &filename, &pages).await?;

        let registered = self
            .register(path, &filename, title, &collection_name, &report)
            .await;
        let book = match registered {
            Ok(book) => book,
            Err(e) => {
                self.discard(&collection_name, &filename).await;
                return Err(e);
            }
        };
        info!(book_id = book.id, title = %book.title, records = report.records, "book ingested");

        let summary = if auto_summary {
            match self.summarize(book.id).await {
                Ok(s) => Some(s.text),
                Err(e) => {
                    warn!(book_id = book.id, error = %e, "automatic summary failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(IngestOutcome {
            book,
            report,
            summary,
        })
    }

    async fn register(
        &self,
        path: &Path,
        filename: &str,
        title: Option<&str>,
        collection_name: &str,
        report: &BuildReport,
    ) -> Result<Book> {
        let stored = self.store_upload(path, collection_name, filename)?;
        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| default_title(filename));

        let id = self
            .catalog
            .create_book(&NewBook {
                title,
                filename: filename.to_string(),
                file_path: stored.display().to_string(),
                collection_name: collection_name.to_string(),
                pages: report.pages as i64,
                total_chars: report.total_chars as i64,
            })
            .await?;
        self.catalog.require_book(id).await
    }

    fn upload_path(&self, collection_name: &str, filename: &str) -> PathBuf {
        self.config
            .library
            .uploads_dir
            .join(format!("{}_{}", collection_name, filename))
    }

    fn store_upload(&self, path: &Path, collection_name: &str, filename: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.library.uploads_dir)?;
        let dest = self.upload_path(collection_name, filename);
        std::fs::copy(path, &dest)?;
        Ok(dest)
    }

    /// Undo a build whose book record could not be created. Failures here
    /// are logged so the caller still sees the registration error.
    async fn discard(&self, collection_name: &str, filename: &str) {
        if let Err(e) = self.index.delete(collection_name).await {
            warn!(collection = collection_name, error = %e, "could not remove orphaned collection");
        }
        remove_stored_file(&self.upload_path(collection_name, filename));
    }

    async fn attach(&self, book: &Book) -> Result<CollectionHandle> {
        self.index.open(&book.collection_name).await
    }

    /// Answer a question about a book and record the exchange.
    pub async fn ask(&self, book_id: i64, question: &str) -> Result<Answer> {
        let book = self.catalog.require_book(book_id).await?;
        let handle = self.attach(&book).await?;
        let answer = self.answerer.answer(&handle, question).await?;

        self.catalog
            .add_turn(book_id, question.trim(), &answer.text, &answer.sources)
            .await?;
        self.catalog.touch(book_id).await?;
        Ok(answer)
    }

    /// Generate and store a new summary for a book.
    pub async fn summarize(&self, book_id: i64) -> Result<Summary> {
        let book = self.catalog.require_book(book_id).await?;
        let handle = self.attach(&book).await?;
        let text = self.summarizer.summarize(&handle).await?;

        let summary = self.catalog.add_summary(book_id, &text).await?;
        self.catalog.touch(book_id).await?;
        Ok(summary)
    }

    /// Raw retrieval against a book's collection.
    pub async fn search(&self, book_id: i64, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".into()));
        }
        let book = self.catalog.require_book(book_id).await?;
        let handle = self.attach(&book).await?;
        self.retriever.retrieve(&handle, query.trim(), k).await
    }

    pub async fn list(&self, query: &BookQuery) -> Result<Vec<Book>> {
        self.catalog.list_books(query).await
    }

    pub async fn count_books(&self) -> Result<i64> {
        self.catalog.count_books().await
    }

    /// A book with its latest summary, marking it as accessed.
    pub async fn show(&self, book_id: i64) -> Result<(Book, Option<Summary>)> {
        self.catalog.touch(book_id).await?;
        let book = self.catalog.require_book(book_id).await?;
        let summary = self.catalog.latest_summary(book_id).await?;
        Ok((book, summary))
    }

    pub async fn history(&self, book_id: i64, limit: usize) -> Result<Vec<ChatTurn>> {
        self.catalog.require_book(book_id).await?;
        self.catalog.list_turns(book_id, limit).await
    }

    /// Remove a book, its history, its collection and its stored file.
    ///
    /// The collection goes first: if that fails the book record is still
    /// there and the delete can simply be retried.
    pub async fn delete_book(&self, book_id: i64) -> Result<Book> {
        let book = self.catalog.require_book(book_id).await?;
        self.index.delete(&book.collection_name).await?;
        let book = self.catalog.delete_book(book_id).await?;

        remove_stored_file(Path::new(&book.file_path));
        info!(book_id, collection = %book.collection_name, "book deleted");
        Ok(book)
    }

    pub async fn stats(&self, largest: usize) -> Result<LibraryStats> {
        self.catalog.stats(largest).await
    }
}

/// Remove a stored upload. A file that is already gone is fine.
fn remove_stored_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove stored file"),
    }
}

/// Title derived from a file name: the stem with separators turned into spaces.
pub fn default_title(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let title = stem.replace(['_', '-'], " ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        filename.to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_title() {
        assert_eq!(default_title("moby_dick.pdf"), "moby dick");
        assert_eq!(default_title("war-and--peace.txt"), "war and peace");
        assert_eq!(default_title("README"), "README");
    }
}

//! Ingestion pipeline: pages → chunks → vectors → collection.
//!
//! The build slot for the target collection is claimed before any embedding
//! work starts and held until the collection is written, so two ingestions
//! aimed at the same collection cannot interleave. Embedding happens before
//! the index is touched; an embedding failure therefore leaves nothing
//! behind.

use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::chunk::chunk_pages;
use crate::config::ChunkingConfig;
use crate::embedding::{embed_all, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::{pair_records, CollectionHandle, CorpusIndex};
use crate::models::Page;

/// Fresh collection name for a new book.
pub fn new_collection_name() -> String {
    format!("book_{}", Uuid::new_v4())
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub collection: CollectionHandle,
    pub pages: usize,
    pub records: usize,
    pub total_chars: usize,
}

#[derive(Clone)]
pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn CorpusIndex>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn CorpusIndex>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            chunking,
            batch_size,
        }
    }

    /// Chunk, embed and index `pages` into the collection `name`.
    ///
    /// Fails with `BuildConflict` if a build for `name` is already running,
    /// `ExtractionEmpty` if the pages hold no text, and
    /// `EmbeddingUnavailable` if any batch cannot be embedded.
    pub async fn ingest(&self, name: &str, source_name: &str, pages: &[Page]) -> Result<BuildReport> {
        let span = info_span!("ingest", collection = name, source = source_name);
        self.build(name, source_name, pages).instrument(span).await
    }

    async fn build(&self, name: &str, source_name: &str, pages: &[Page]) -> Result<BuildReport> {
        let guard = self.index.begin_build(name)?;

        let chunks = chunk_pages(pages, self.chunking.chunk_size, self.chunking.chunk_overlap);
        if chunks.is_empty() {
            return Err(RagError::ExtractionEmpty {
                source_name: source_name.to_string(),
            });
        }
        debug!(pages = pages.len(), chunks = chunks.len(), "chunked");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), &texts, self.batch_size).await?;
        let records = pair_records(&chunks, vectors)?;
        let record_count = records.len();

        let collection = self.index.build(&guard, records).await?;
        drop(guard);

        let total_chars = pages.iter().map(|p| p.text.chars().count()).sum();
        info!(records = record_count, "collection ready");

        Ok(BuildReport {
            collection,
            pages: pages.len(),
            records: record_count,
            total_chars,
        })
    }
}

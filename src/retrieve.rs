//! Query-time retrieval: embed the query, search the collection.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::{CollectionHandle, CorpusIndex};
use crate::models::RetrievedChunk;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn CorpusIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn CorpusIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` chunks for `query`, best first. An empty result is not an error.
    pub async fn retrieve(
        &self,
        handle: &CollectionHandle,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        let hits = self.index.search(handle, &vector, k).await?;
        debug!(collection = %handle.name, k, hits = hits.len(), "retrieved");
        Ok(hits)
    }

    /// Fail with `EmptyContext` unless the collection holds at least one record.
    pub async fn ensure_populated(&self, handle: &CollectionHandle) -> Result<()> {
        if self.index.count(handle).await? == 0 {
            return Err(RagError::EmptyContext {
                collection: handle.name.clone(),
            });
        }
        Ok(())
    }
}

//! Per-corpus vector collections.
//!
//! The [`CorpusIndex`] trait defines the operations the pipeline needs from a
//! vector store: build a collection atomically, attach to an existing one,
//! search it, and delete it. Each book owns exactly one collection; nothing
//! is shared between collections, so a build for one book never changes
//! what another book's searches return.
//!
//! # Readiness
//!
//! A collection moves through three observable states:
//!
//! | State | `open` | `search` |
//! |-------|--------|----------|
//! | never created / deleted | `CollectionNotFound` | `CollectionNotFound` |
//! | build in flight | `IndexNotReady` | — |
//! | exists (possibly empty) | handle | top-k (possibly `[]`) |
//!
//! An empty collection is valid but useless; callers probe it with
//! [`count`](CorpusIndex::count) before trusting it.
//!
//! # Build exclusivity
//!
//! [`BuildSlots`] is a process-wide registry of collection names with a
//! build in flight. [`begin_build`](CorpusIndex::begin_build) claims a slot
//! and returns a [`BuildGuard`] that releases it on drop; a second claim for
//! the same name fails with `BuildConflict`.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::{Config, Metric};
use crate::embedding::{cosine_similarity, dot_product};
use crate::error::{RagError, Result};
use crate::models::{Chunk, NewRecord, RetrievedChunk};

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Process-wide index settings. Every collection shares them.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    pub dims: usize,
    pub metric: Metric,
    pub min_score: Option<f32>,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dims: config.embedding_dims(),
            metric: config.index.metric,
            min_score: config.retrieval.min_score,
        }
    }
}

/// An attached collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub dims: usize,
    pub metric: Metric,
}

/// Registry of collection names with a build in flight.
#[derive(Debug, Clone, Default)]
pub struct BuildSlots {
    building: Arc<Mutex<HashSet<String>>>,
}

impl BuildSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the build slot for `name`, or fail with `BuildConflict`.
    pub fn try_claim(&self, name: &str) -> Result<BuildGuard> {
        let mut building = self
            .building
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !building.insert(name.to_string()) {
            return Err(RagError::BuildConflict {
                collection: name.to_string(),
            });
        }
        Ok(BuildGuard {
            slots: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn is_building(&self, name: &str) -> bool {
        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

/// Exclusive right to build one collection. Released on drop.
#[derive(Debug)]
pub struct BuildGuard {
    slots: BuildSlots,
    name: String,
}

impl BuildGuard {
    pub fn collection(&self) -> &str {
        &self.name
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.slots
            .building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Abstract vector store holding one collection per corpus.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](CorpusIndex::create_collection) | Register an empty collection |
/// | [`begin_build`](CorpusIndex::begin_build) | Claim the build slot for a name |
/// | [`build`](CorpusIndex::build) | Atomically (re)populate a claimed collection |
/// | [`build_collection`](CorpusIndex::build_collection) | Claim + build in one call |
/// | [`open`](CorpusIndex::open) | Attach to an existing collection |
/// | [`count`](CorpusIndex::count) | Number of records (readiness probe) |
/// | [`search`](CorpusIndex::search) | Top-k records by similarity |
/// | [`delete`](CorpusIndex::delete) | Remove a collection; idempotent |
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    fn settings(&self) -> &IndexSettings;

    fn slots(&self) -> &BuildSlots;

    fn begin_build(&self, name: &str) -> Result<BuildGuard> {
        self.slots().try_claim(name)
    }

    /// Register `name` with no records. Existing collections are left as they are.
    async fn create_collection(&self, name: &str) -> Result<CollectionHandle>;

    /// Replace the contents of the guarded collection with `records`.
    ///
    /// Either every record becomes visible or none does.
    async fn build(&self, guard: &BuildGuard, records: Vec<NewRecord>) -> Result<CollectionHandle>;

    /// Claim the build slot for `name` and build it from paired chunks and vectors.
    async fn build_collection(
        &self,
        name: &str,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<CollectionHandle> {
        let guard = self.begin_build(name)?;
        let records = pair_records(chunks, embeddings)?;
        self.build(&guard, records).await
    }

    async fn open(&self, name: &str) -> Result<CollectionHandle>;

    async fn count(&self, handle: &CollectionHandle) -> Result<usize>;

    async fn search(
        &self,
        handle: &CollectionHandle,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Zip chunks with their vectors, rejecting a count mismatch.
pub fn pair_records(chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<Vec<NewRecord>> {
    if chunks.len() != embeddings.len() {
        return Err(RagError::InvalidInput(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(chunks
        .iter()
        .zip(embeddings)
        .map(|(c, vector)| NewRecord {
            page: c.page,
            text: c.text.clone(),
            vector,
        })
        .collect())
}

/// A record as held by a backend. `seq` is its insertion position.
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub seq: i64,
    pub page: u32,
    pub text: String,
    pub vector: Vec<f32>,
}

pub(crate) fn describe_space(dims: usize, metric: Metric) -> String {
    format!("{}-dimensional {} vectors", dims, metric.as_str())
}

/// Reject records whose vectors do not live in the configured space.
pub(crate) fn check_records(settings: &IndexSettings, records: &[NewRecord]) -> Result<()> {
    if let Some(bad) = records.iter().find(|r| r.vector.len() != settings.dims) {
        return Err(RagError::InvalidInput(format!(
            "record from page {} has a {}-dimensional vector, expected {}",
            bad.page,
            bad.vector.len(),
            settings.dims
        )));
    }
    Ok(())
}

/// Reject a collection built in a different space than the process uses.
pub(crate) fn check_space(
    settings: &IndexSettings,
    name: &str,
    dims: usize,
    metric: Metric,
) -> Result<CollectionHandle> {
    if dims != settings.dims || metric != settings.metric {
        return Err(RagError::DimensionMismatch {
            collection: name.to_string(),
            expected: describe_space(settings.dims, settings.metric),
            actual: describe_space(dims, metric),
        });
    }
    Ok(CollectionHandle {
        name: name.to_string(),
        dims,
        metric,
    })
}

/// Score, filter and order records for a query.
///
/// Results are sorted by descending score; equal scores keep insertion order.
pub(crate) fn rank(
    handle: &CollectionHandle,
    min_score: Option<f32>,
    query: &[f32],
    records: &[StoredRecord],
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    if query.len() != handle.dims {
        return Err(RagError::DimensionMismatch {
            collection: handle.name.clone(),
            expected: describe_space(handle.dims, handle.metric),
            actual: format!("a {}-dimensional query", query.len()),
        });
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut scored: Vec<RetrievedChunk> = records
        .iter()
        .map(|r| RetrievedChunk {
            seq: r.seq,
            page: r.page,
            text: r.text.clone(),
            score: match handle.metric {
                Metric::Cosine => cosine_similarity(query, &r.vector),
                Metric::Dot => dot_product(query, &r.vector),
            },
        })
        .filter(|r| min_score.map_or(true, |floor| r.score >= floor))
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
    scored.truncate(k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: i64, vector: Vec<f32>) -> StoredRecord {
        StoredRecord {
            seq,
            page: seq as u32 + 1,
            text: format!("record {}", seq),
            vector,
        }
    }

    fn handle(dims: usize, metric: Metric) -> CollectionHandle {
        CollectionHandle {
            name: "book_test".into(),
            dims,
            metric,
        }
    }

    #[test]
    fn test_rank_orders_by_descending_score() {
        let records = vec![
            record(0, vec![0.0, 1.0]),
            record(1, vec![1.0, 0.0]),
            record(2, vec![1.0, 1.0]),
        ];
        let out = rank(&handle(2, Metric::Cosine), None, &[1.0, 0.0], &records, 3).unwrap();
        let seqs: Vec<i64> = out.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 0]);
        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let records: Vec<StoredRecord> = (0..6).map(|i| record(i, vec![1.0, 0.0])).collect();
        let out = rank(&handle(2, Metric::Cosine), None, &[2.0, 0.0], &records, 4).unwrap();
        let seqs: Vec<i64> = out.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rank_min_score_floor() {
        let records = vec![record(0, vec![1.0, 0.0]), record(1, vec![0.0, 1.0])];
        let out = rank(&handle(2, Metric::Cosine), Some(0.5), &[1.0, 0.0], &records, 5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seq, 0);
    }

    #[test]
    fn test_rank_dot_metric_uses_magnitude() {
        let records = vec![record(0, vec![1.0, 0.0]), record(1, vec![3.0, 0.0])];
        let out = rank(&handle(2, Metric::Dot), None, &[1.0, 0.0], &records, 2).unwrap();
        assert_eq!(out[0].seq, 1);
        assert_eq!(out[0].score, 3.0);
    }

    #[test]
    fn test_rank_rejects_query_of_wrong_dimension() {
        let err = rank(&handle(3, Metric::Cosine), None, &[1.0], &[], 5).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_build_slots_are_exclusive_per_name() {
        let slots = BuildSlots::new();
        let guard = slots.try_claim("book_a").unwrap();
        assert!(matches!(
            slots.try_claim("book_a"),
            Err(RagError::BuildConflict { .. })
        ));
        let other = slots.try_claim("book_b").unwrap();
        assert!(slots.is_building("book_a"));
        drop(guard);
        assert!(!slots.is_building("book_a"));
        assert!(slots.try_claim("book_a").is_ok());
        drop(other);
    }

    #[test]
    fn test_pair_records_count_mismatch() {
        let chunks = vec![Chunk {
            page: 1,
            index_in_page: 0,
            start: 0,
            end: 1,
            text: "a".into(),
        }];
        assert!(matches!(
            pair_records(&chunks, vec![]),
            Err(RagError::InvalidInput(_))
        ));
    }
}

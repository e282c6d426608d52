//! In-memory [`CorpusIndex`] implementation for tests and ephemeral runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. A build
//! assembles the full record list first and swaps it in under one write
//! lock, so readers never observe a partial collection.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{NewRecord, RetrievedChunk};

use super::{
    check_records, check_space, rank, BuildGuard, BuildSlots, CollectionHandle, CorpusIndex,
    IndexSettings, StoredRecord,
};

struct MemCollection {
    handle: CollectionHandle,
    records: Vec<StoredRecord>,
}

pub struct MemoryIndex {
    settings: IndexSettings,
    slots: BuildSlots,
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl MemoryIndex {
    pub fn new(settings: IndexSettings) -> Self {
        Self {
            settings,
            slots: BuildSlots::new(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn not_found(name: &str) -> RagError {
        RagError::CollectionNotFound {
            collection: name.to_string(),
        }
    }
}

#[async_trait]
impl CorpusIndex for MemoryIndex {
    fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    fn slots(&self) -> &BuildSlots {
        &self.slots
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionHandle> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| MemCollection {
                handle: CollectionHandle {
                    name: name.to_string(),
                    dims: self.settings.dims,
                    metric: self.settings.metric,
                },
                records: Vec::new(),
            });
        Ok(entry.handle.clone())
    }

    async fn build(&self, guard: &BuildGuard, records: Vec<NewRecord>) -> Result<CollectionHandle> {
        check_records(&self.settings, &records)?;
        let name = guard.collection();
        let handle = CollectionHandle {
            name: name.to_string(),
            dims: self.settings.dims,
            metric: self.settings.metric,
        };
        let stored = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| StoredRecord {
                seq: i as i64,
                page: r.page,
                text: r.text,
                vector: r.vector,
            })
            .collect();

        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                MemCollection {
                    handle: handle.clone(),
                    records: stored,
                },
            );
        Ok(handle)
    }

    async fn open(&self, name: &str) -> Result<CollectionHandle> {
        if self.slots.is_building(name) {
            return Err(RagError::IndexNotReady {
                collection: name.to_string(),
            });
        }
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let c = collections.get(name).ok_or_else(|| Self::not_found(name))?;
        check_space(&self.settings, name, c.handle.dims, c.handle.metric)
    }

    async fn count(&self, handle: &CollectionHandle) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .get(&handle.name)
            .map(|c| c.records.len())
            .ok_or_else(|| Self::not_found(&handle.name))
    }

    async fn search(
        &self,
        handle: &CollectionHandle,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let c = collections
            .get(&handle.name)
            .ok_or_else(|| Self::not_found(&handle.name))?;
        rank(handle, self.settings.min_score, query, &c.records, k)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Metric;

    fn settings() -> IndexSettings {
        IndexSettings {
            dims: 2,
            metric: Metric::Cosine,
            min_score: None,
        }
    }

    fn rec(page: u32, v: [f32; 2]) -> NewRecord {
        NewRecord {
            page,
            text: format!("page {}", page),
            vector: v.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_build_open_search() {
        let index = MemoryIndex::new(settings());
        let guard = index.begin_build("book_a").unwrap();
        index
            .build(&guard, vec![rec(1, [1.0, 0.0]), rec(2, [0.0, 1.0])])
            .await
            .unwrap();
        drop(guard);

        let handle = index.open("book_a").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 2);
        let hits = index.search(&handle, &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].page, 2);
    }

    #[tokio::test]
    async fn test_build_collection_pairs_chunks_with_vectors() {
        let index = MemoryIndex::new(settings());
        let chunks: Vec<crate::models::Chunk> = (1..=2)
            .map(|page| crate::models::Chunk {
                page,
                index_in_page: 0,
                start: 0,
                end: 4,
                text: format!("p{}", page),
            })
            .collect();
        let handle = index
            .build_collection("book_a", &chunks, vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 2);
        assert!(!index.slots().is_building("book_a"));

        let hits = index.search(&handle, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "p1");
        assert_eq!(hits[1].seq, 1);
    }

    #[tokio::test]
    async fn test_open_while_building_is_not_ready() {
        let index = MemoryIndex::new(settings());
        let _guard = index.begin_build("book_a").unwrap();
        assert!(matches!(
            index.open("book_a").await,
            Err(RagError::IndexNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_records() {
        let index = MemoryIndex::new(settings());
        for _ in 0..2 {
            let guard = index.begin_build("book_a").unwrap();
            index
                .build(&guard, vec![rec(1, [1.0, 0.0]), rec(2, [0.0, 1.0])])
                .await
                .unwrap();
        }
        let handle = index.open("book_a").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = MemoryIndex::new(settings());
        let handle = index.create_collection("book_a").await.unwrap();
        index.delete("book_a").await.unwrap();
        index.delete("book_a").await.unwrap();
        assert!(matches!(
            index.search(&handle, &[1.0, 0.0], 3).await,
            Err(RagError::CollectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_vector_rejected_without_side_effects() {
        let index = MemoryIndex::new(settings());
        let guard = index.begin_build("book_a").unwrap();
        let bad = NewRecord {
            page: 1,
            text: "x".into(),
            vector: vec![1.0, 0.0, 0.0],
        };
        assert!(index.build(&guard, vec![bad]).await.is_err());
        drop(guard);
        assert!(matches!(
            index.open("book_a").await,
            Err(RagError::CollectionNotFound { .. })
        ));
    }
}

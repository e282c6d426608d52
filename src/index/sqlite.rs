//! SQLite-backed [`CorpusIndex`] implementation.
//!
//! Collections are rows in `collections`; their records live in
//! `index_records` with vectors stored as little-endian `f32` BLOBs. A build
//! deletes and re-inserts a collection's records inside one transaction, so
//! a crash or error mid-build leaves the previous contents (or nothing)
//! behind. Search is brute force over the collection's records.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::Metric;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{NewRecord, RetrievedChunk};

use super::{
    check_records, check_space, rank, BuildGuard, BuildSlots, CollectionHandle, CorpusIndex,
    IndexSettings, StoredRecord,
};

struct CollectionRow {
    dims: usize,
    metric: Metric,
    record_count: usize,
}

pub struct SqliteIndex {
    pool: SqlitePool,
    settings: IndexSettings,
    slots: BuildSlots,
}

impl SqliteIndex {
    /// Wrap a migrated pool. The build-slot registry is private to this
    /// instance; share the instance to share exclusivity.
    pub fn new(pool: SqlitePool, settings: IndexSettings) -> Self {
        Self {
            pool,
            settings,
            slots: BuildSlots::new(),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<CollectionRow>> {
        let row = sqlx::query("SELECT dims, metric, record_count FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let dims: i64 = row.get("dims");
        let record_count: i64 = row.get("record_count");
        let metric: String = row.get("metric");
        let metric = Metric::parse(&metric).ok_or_else(|| {
            RagError::InvalidInput(format!(
                "collection {} has unknown metric '{}'",
                name, metric
            ))
        })?;
        Ok(Some(CollectionRow {
            dims: dims as usize,
            metric,
            record_count: record_count as usize,
        }))
    }

    async fn require(&self, name: &str) -> Result<CollectionRow> {
        match self.lookup(name).await? {
            Some(row) => Ok(row),
            None => Err(RagError::CollectionNotFound {
                collection: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CorpusIndex for SqliteIndex {
    fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    fn slots(&self) -> &BuildSlots {
        &self.slots
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionHandle> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, dims, metric, record_count)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(self.settings.dims as i64)
        .bind(self.settings.metric.as_str())
        .execute(&self.pool)
        .await?;

        Ok(CollectionHandle {
            name: name.to_string(),
            dims: self.settings.dims,
            metric: self.settings.metric,
        })
    }

    async fn build(&self, guard: &BuildGuard, records: Vec<NewRecord>) -> Result<CollectionHandle> {
        check_records(&self.settings, &records)?;
        let name = guard.collection();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO collections (name, dims, metric, record_count)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                dims = excluded.dims,
                metric = excluded.metric,
                record_count = excluded.record_count
            "#,
        )
        .bind(name)
        .bind(self.settings.dims as i64)
        .bind(self.settings.metric.as_str())
        .bind(records.len() as i64)
        .execute(&mut *tx)
        .await?;

        for (seq, record) in records.iter().enumerate() {
            sqlx::query(
                "INSERT INTO index_records (collection, seq, page, text, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(seq as i64)
            .bind(record.page as i64)
            .bind(&record.text)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(collection = name, records = records.len(), "collection built");

        Ok(CollectionHandle {
            name: name.to_string(),
            dims: self.settings.dims,
            metric: self.settings.metric,
        })
    }

    async fn open(&self, name: &str) -> Result<CollectionHandle> {
        if self.slots.is_building(name) {
            return Err(RagError::IndexNotReady {
                collection: name.to_string(),
            });
        }
        match self.lookup(name).await? {
            Some(row) => check_space(&self.settings, name, row.dims, row.metric),
            None => Err(RagError::CollectionNotFound {
                collection: name.to_string(),
            }),
        }
    }

    async fn count(&self, handle: &CollectionHandle) -> Result<usize> {
        // Maintained by `build` in the same transaction as the records.
        Ok(self.require(&handle.name).await?.record_count)
    }

    async fn search(
        &self,
        handle: &CollectionHandle,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.require(&handle.name).await?;

        let rows = sqlx::query(
            "SELECT seq, page, text, embedding FROM index_records WHERE collection = ? ORDER BY seq",
        )
        .bind(&handle.name)
        .fetch_all(&self.pool)
        .await?;

        let records: Vec<StoredRecord> = rows
            .iter()
            .map(|row| {
                let page: i64 = row.get("page");
                let blob: Vec<u8> = row.get("embedding");
                StoredRecord {
                    seq: row.get("seq"),
                    page: page as u32,
                    text: row.get("text"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        rank(handle, self.settings.min_score, query, &records, k)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use tempfile::TempDir;

    async fn setup(dims: usize, metric: Metric) -> (TempDir, SqlitePool, SqliteIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let index = SqliteIndex::new(
            pool.clone(),
            IndexSettings {
                dims,
                metric,
                min_score: None,
            },
        );
        (tmp, pool, index)
    }

    fn rec(page: u32, vector: Vec<f32>) -> NewRecord {
        NewRecord {
            page,
            text: format!("text of page {}", page),
            vector,
        }
    }

    #[tokio::test]
    async fn test_build_and_search_round() {
        let (_tmp, _pool, index) = setup(2, Metric::Cosine).await;
        let guard = index.begin_build("book_a").unwrap();
        index
            .build(
                &guard,
                vec![
                    rec(1, vec![1.0, 0.0]),
                    rec(2, vec![0.7, 0.7]),
                    rec(3, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        drop(guard);

        let handle = index.open("book_a").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 3);
        let hits = index.search(&handle, &[1.0, 0.1], 2).await.unwrap();
        let pages: Vec<u32> = hits.iter().map(|h| h.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(hits[0].text, "text of page 1");
    }

    #[tokio::test]
    async fn test_open_missing_collection() {
        let (_tmp, _pool, index) = setup(2, Metric::Cosine).await;
        assert!(matches!(
            index.open("book_missing").await,
            Err(RagError::CollectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_shell_collection() {
        let (_tmp, _pool, index) = setup(2, Metric::Cosine).await;
        index.create_collection("book_shell").await.unwrap();
        let handle = index.open("book_shell").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 0);
        assert!(index.search(&handle, &[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_open() {
        let (tmp, pool, index) = setup(2, Metric::Cosine).await;
        index.create_collection("book_a").await.unwrap();

        let other = SqliteIndex::new(
            pool,
            IndexSettings {
                dims: 4,
                metric: Metric::Cosine,
                min_score: None,
            },
        );
        assert!(matches!(
            other.open("book_a").await,
            Err(RagError::DimensionMismatch { .. })
        ));
        drop(tmp);
    }

    #[tokio::test]
    async fn test_delete_removes_records_and_is_idempotent() {
        let (_tmp, pool, index) = setup(2, Metric::Cosine).await;
        let guard = index.begin_build("book_a").unwrap();
        index
            .build(&guard, vec![rec(1, vec![1.0, 0.0])])
            .await
            .unwrap();
        drop(guard);
        let handle = index.open("book_a").await.unwrap();

        index.delete("book_a").await.unwrap();
        index.delete("book_a").await.unwrap();

        assert!(matches!(
            index.search(&handle, &[1.0, 0.0], 1).await,
            Err(RagError::CollectionNotFound { .. })
        ));
        let row = sqlx::query("SELECT COUNT(*) AS n FROM index_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        let n: i64 = row.get("n");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_previous_contents() {
        let (_tmp, _pool, index) = setup(2, Metric::Cosine).await;
        let guard = index.begin_build("book_a").unwrap();
        index
            .build(&guard, vec![rec(1, vec![1.0, 0.0])])
            .await
            .unwrap();

        let bad = vec![rec(2, vec![1.0, 0.0, 0.0])];
        assert!(index.build(&guard, bad).await.is_err());
        drop(guard);

        let handle = index.open("book_a").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_tracks_rebuilds() {
        let (_tmp, pool, index) = setup(2, Metric::Cosine).await;
        let guard = index.begin_build("book_a").unwrap();
        index
            .build(
                &guard,
                vec![rec(1, vec![1.0, 0.0]), rec(2, vec![0.0, 1.0]), rec(3, vec![0.5, 0.5])],
            )
            .await
            .unwrap();
        index
            .build(&guard, vec![rec(1, vec![1.0, 0.0])])
            .await
            .unwrap();
        drop(guard);

        let handle = index.open("book_a").await.unwrap();
        assert_eq!(index.count(&handle).await.unwrap(), 1);
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_records WHERE collection = ?")
            .bind("book_a")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }
}

//! SQLite-backed [`SchemaIndex`] implementation.
//!
//! Stores one row per catalog table in `schema_index` (see [`crate::migrate`]).
//! Vectors are little-endian f32 BLOBs. `publish` runs in a single
//! transaction, so readers see either the old index or the new one.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use sql_copilot_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use sql_copilot_core::store::{
    sort_candidates, EntryFingerprint, IndexEntry, SchemaIndex, TableCandidate,
};

/// SQLite implementation of the [`SchemaIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SchemaIndex for SqliteIndex {
    async fn publish(&self, entries: &[IndexEntry], live_tables: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let blob = vec_to_blob(&entry.vector);
            sqlx::query(
                r#"
                INSERT INTO schema_index (table_name, document, doc_hash, embedding, model, dims)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(table_name) DO UPDATE SET
                    document = excluded.document,
                    doc_hash = excluded.doc_hash,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dims = excluded.dims
                "#,
            )
            .bind(&entry.table_name)
            .bind(&entry.document)
            .bind(&entry.doc_hash)
            .bind(&blob)
            .bind(&entry.model)
            .bind(entry.vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        let live: HashSet<&str> = live_tables.iter().map(|s| s.as_str()).collect();
        let stored: Vec<String> = sqlx::query_scalar("SELECT table_name FROM schema_index")
            .fetch_all(&mut *tx)
            .await?;
        for name in stored.iter().filter(|n| !live.contains(n.as_str())) {
            sqlx::query("DELETE FROM schema_index WHERE table_name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<TableCandidate>> {
        let rows = sqlx::query("SELECT table_name, embedding FROM schema_index")
            .fetch_all(&self.pool)
            .await?;

        let mut candidates: Vec<TableCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                TableCandidate {
                    table_name: row.get("table_name"),
                    score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            "SELECT table_name, document, doc_hash, embedding, model FROM schema_index ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    table_name: row.get("table_name"),
                    vector: blob_to_vec(&blob),
                    document: row.get("document"),
                    doc_hash: row.get("doc_hash"),
                    model: row.get("model"),
                }
            })
            .collect())
    }

    async fn fingerprints(&self) -> Result<BTreeMap<String, EntryFingerprint>> {
        let rows = sqlx::query("SELECT table_name, doc_hash, model FROM schema_index")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get("table_name"),
                    EntryFingerprint {
                        doc_hash: row.get("doc_hash"),
                        model: row.get("model"),
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> SqliteIndex {
        let pool = db::connect_writable(&dir.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();
        SqliteIndex::new(pool)
    }

    fn entry(name: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            table_name: name.to_string(),
            vector,
            document: format!("Table Name: {name}"),
            doc_hash: format!("hash-{name}"),
            model: "test-model".to_string(),
        }
    }

    fn live(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_search_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let index = open(&dir).await;
            index
                .publish(
                    &[entry("orders", vec![1.0, 0.0]), entry("customers", vec![0.0, 1.0])],
                    &live(&["customers", "orders"]),
                )
                .await
                .unwrap();
            index.pool().close().await;
        }

        let index = open(&dir).await;
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.search(&[0.9, 0.1], 10).await.unwrap();
        assert_eq!(hits[0].table_name, "orders");
        assert_eq!(hits[1].table_name, "customers");

        let entries = index.entries().await.unwrap();
        assert_eq!(entries[0].table_name, "customers");
        assert_eq!(entries[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_publish_upserts_and_drops_dead_tables() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).await;
        index
            .publish(
                &[entry("a", vec![1.0]), entry("b", vec![1.0])],
                &live(&["a", "b"]),
            )
            .await
            .unwrap();

        let mut updated = entry("a", vec![0.5]);
        updated.doc_hash = "new-hash".to_string();
        index.publish(&[updated], &live(&["a"])).await.unwrap();

        let fps = index.fingerprints().await.unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps["a"].doc_hash, "new-hash");
        assert_eq!(fps["a"].model, "test-model");
    }

    #[tokio::test]
    async fn test_ties_break_by_name() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).await;
        index
            .publish(
                &[entry("zeta", vec![1.0, 0.0]), entry("alpha", vec![1.0, 0.0])],
                &live(&["alpha", "zeta"]),
            )
            .await
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table_name, "alpha");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_search_during_publish_sees_one_generation() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(open(&dir).await);

        let generation = |prefix: &str| {
            let names: Vec<String> = (0..5).map(|i| format!("{prefix}{i}")).collect();
            let entries: Vec<IndexEntry> = names.iter().map(|n| entry(n, vec![1.0, 0.5])).collect();
            (entries, names)
        };
        let (a, a_live) = generation("a");
        let (b, b_live) = generation("b");
        index.publish(&a, &a_live).await.unwrap();

        let writer = {
            let index = index.clone();
            tokio::spawn(async move {
                for round in 0..30 {
                    let (entries, live) = if round % 2 == 0 {
                        (&b, &b_live)
                    } else {
                        (&a, &a_live)
                    };
                    index.publish(entries, live).await.unwrap();
                }
            })
        };

        let mut searches = 0;
        while !writer.is_finished() || searches == 0 {
            let hits = index.search(&[1.0, 0.5], 10).await.unwrap();
            assert_eq!(hits.len(), 5, "partial generation: {hits:?}");
            let prefix = &hits[0].table_name[..1];
            assert!(
                hits.iter().all(|h| h.table_name.starts_with(prefix)),
                "mixed generations: {hits:?}"
            );
            searches += 1;
        }
        writer.await.unwrap();
    }
}

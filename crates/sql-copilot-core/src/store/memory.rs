//! In-memory [`SchemaIndex`] for tests and ephemeral sessions.
//!
//! Entries live in a `BTreeMap` behind `RwLock<Arc<_>>`. `publish` builds a
//! new map under the write lock and swaps the `Arc`, so searches in flight
//! keep the snapshot they started with and concurrent publishes serialize.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{sort_candidates, EntryFingerprint, IndexEntry, SchemaIndex, TableCandidate};

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Arc<BTreeMap<String, IndexEntry>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, IndexEntry>> {
        self.entries.read().unwrap().clone()
    }
}

#[async_trait]
impl SchemaIndex for InMemoryIndex {
    async fn publish(&self, entries: &[IndexEntry], live_tables: &[String]) -> Result<()> {
        let mut current = self.entries.write().unwrap();
        let mut next: BTreeMap<String, IndexEntry> = (**current).clone();
        for e in entries {
            next.insert(e.table_name.clone(), e.clone());
        }
        next.retain(|name, _| live_tables.iter().any(|t| t == name));
        *current = Arc::new(next);
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<TableCandidate>> {
        let snapshot = self.snapshot();
        let mut candidates: Vec<TableCandidate> = snapshot
            .values()
            .map(|e| TableCandidate {
                table_name: e.table_name.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.snapshot().len())
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.snapshot().values().cloned().collect())
    }

    async fn fingerprints(&self) -> Result<BTreeMap<String, EntryFingerprint>> {
        Ok(self
            .snapshot()
            .iter()
            .map(|(name, e)| {
                (
                    name.clone(),
                    EntryFingerprint {
                        doc_hash: e.doc_hash.clone(),
                        model: e.model.clone(),
                    },
                )
            })
            .collect())
    }
}

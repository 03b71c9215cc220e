//! Schema index abstraction.
//!
//! The [`SchemaIndex`] trait is the persistent home of one embedding per
//! catalog table. The indexer writes to it, the retriever reads from it.
//! Backends: [`memory::InMemoryIndex`] here, and the SQLite-backed index in
//! the `sql-copilot` app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// One stored embedding, keyed by table name.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub table_name: String,
    pub vector: Vec<f32>,
    /// The schema document the vector was computed from.
    pub document: String,
    /// SHA-256 of `document`; lets the indexer skip unchanged tables.
    pub doc_hash: String,
    /// Embedding model that produced `vector`.
    pub model: String,
}

/// A table scored against a query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCandidate {
    pub table_name: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// What the indexer needs to know to decide whether a table is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFingerprint {
    pub doc_hash: String,
    pub model: String,
}

/// Abstract schema index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`publish`](SchemaIndex::publish) | Atomically upsert entries and drop tables no longer live |
/// | [`search`](SchemaIndex::search) | Cosine similarity over all entries |
/// | [`count`](SchemaIndex::count) | Number of indexed tables |
/// | [`entries`](SchemaIndex::entries) | All entries, sorted by table name |
/// | [`fingerprints`](SchemaIndex::fingerprints) | Per-table hash and model |
#[async_trait]
pub trait SchemaIndex: Send + Sync {
    /// Upsert `entries` and remove every entry whose table is not in
    /// `live_tables`, as one atomic step. A concurrent reader observes
    /// either the previous index or the new one, never a mix.
    async fn publish(&self, entries: &[IndexEntry], live_tables: &[String]) -> Result<()>;

    /// Score every entry against `query_vec`. Sorted by score descending,
    /// ties broken by table name ascending, truncated to `limit`.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<TableCandidate>>;

    async fn count(&self) -> Result<usize>;

    async fn entries(&self) -> Result<Vec<IndexEntry>>;

    async fn fingerprints(&self) -> Result<BTreeMap<String, EntryFingerprint>>;
}

/// Shared ordering for search results: score desc, then name asc.
pub fn sort_candidates(candidates: &mut [TableCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.table_name.cmp(&b.table_name))
    });
}

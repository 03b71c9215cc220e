//! Schema indexer: one embedding per catalog table.
//!
//! Renders every table's [`SchemaDocument`], embeds the documents in
//! batches, and publishes the resulting [`IndexEntry`] set to a
//! [`SchemaIndex`] in a single atomic step.
//!
//! Incremental by default: a table whose document hash and embedding model
//! match the stored entry is skipped. Embedding failures are attributed to
//! individual tables (a failed batch is retried one table at a time) and
//! the successful tables are still published, so a caller can retry just
//! the failures with [`IndexMode::Only`].

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, SchemaDocument};
use crate::embedding::Embedder;
use crate::error::IndexingError;
use crate::store::{EntryFingerprint, IndexEntry, SchemaIndex};

/// Which tables to (re-)embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMode {
    /// Tables that are missing from the index or whose document/model changed.
    Incremental,
    /// Every table, regardless of what is stored.
    Rebuild,
    /// Only the named tables (case-insensitive).
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexBuildReport {
    pub model: String,
    /// Tables embedded and published in this run.
    pub indexed: Vec<String>,
    /// Tables left untouched because their entry is current or not selected.
    pub skipped: Vec<String>,
    pub failed: Vec<TableFailure>,
    /// Entries removed because their table no longer exists.
    pub removed: Vec<String>,
}

impl IndexBuildReport {
    pub fn failed_tables(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.table.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Err` if any table failed; the error still carries the full report.
    pub fn into_result(self) -> Result<IndexBuildReport, IndexingError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(IndexingError { report: self })
        }
    }
}

/// Index `catalog` into `index` using `embedder`.
///
/// Returns the report on full success and [`IndexingError`] (carrying the
/// report) when any table failed. Successful tables are published either way.
pub async fn index_catalog(
    catalog: &Catalog,
    embedder: &dyn Embedder,
    index: &dyn SchemaIndex,
    mode: &IndexMode,
    batch_size: usize,
) -> Result<IndexBuildReport, IndexingError> {
    let model = embedder.model_name().to_string();
    let mut report = IndexBuildReport {
        model: model.clone(),
        ..Default::default()
    };

    let stored = match index.fingerprints().await {
        Ok(fps) => fps,
        Err(e) => {
            report.failed = catalog
                .tables()
                .iter()
                .map(|t| TableFailure {
                    table: t.name.clone(),
                    error: format!("reading schema index: {e:#}"),
                })
                .collect();
            return report.into_result();
        }
    };

    if let IndexMode::Only(names) = mode {
        for name in names {
            if catalog.table(name).is_none() {
                report.failed.push(TableFailure {
                    table: name.clone(),
                    error: "table not in catalog".to_string(),
                });
            }
        }
    }

    let mut pending: Vec<SchemaDocument> = Vec::new();
    for table in catalog.tables() {
        let doc = SchemaDocument::render(table);
        if is_selected(mode, &table.name, &doc, &model, &stored) {
            pending.push(doc);
        } else {
            report.skipped.push(table.name.clone());
        }
    }

    info!(
        model = %model,
        pending = pending.len(),
        skipped = report.skipped.len(),
        "indexing schema"
    );

    let mut entries: Vec<IndexEntry> = Vec::with_capacity(pending.len());
    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        match embed_checked(embedder, &texts).await {
            Ok(vectors) => {
                for (doc, vector) in batch.iter().zip(vectors) {
                    entries.push(entry_for(doc, vector, &model));
                }
            }
            Err(batch_err) if batch.len() > 1 => {
                debug!(error = %batch_err, "batch embedding failed, retrying per table");
                for doc in batch {
                    match embed_checked(embedder, std::slice::from_ref(&doc.text)).await {
                        Ok(mut v) => entries.push(entry_for(doc, v.remove(0), &model)),
                        Err(e) => report.failed.push(TableFailure {
                            table: doc.table_name.clone(),
                            error: e,
                        }),
                    }
                }
            }
            Err(e) => report.failed.push(TableFailure {
                table: batch[0].table_name.clone(),
                error: e,
            }),
        }
    }

    // A failed table keeps its stored entry only if that entry still
    // matches the current document.
    let live: Vec<String> = catalog
        .tables()
        .iter()
        .filter(|t| {
            let failed = report.failed.iter().any(|f| f.table == t.name);
            if !failed {
                return true;
            }
            let doc = SchemaDocument::render(t);
            is_current(&t.name, &doc, &model, &stored)
        })
        .map(|t| t.name.clone())
        .collect();

    report.removed = stored
        .keys()
        .filter(|name| !live.contains(name))
        .cloned()
        .collect();

    if let Err(e) = index.publish(&entries, &live).await {
        for entry in &entries {
            report.failed.push(TableFailure {
                table: entry.table_name.clone(),
                error: format!("publishing schema index: {e:#}"),
            });
        }
        report.removed.clear();
        return report.into_result();
    }

    report.indexed = entries.into_iter().map(|e| e.table_name).collect();
    for failure in &report.failed {
        warn!(table = %failure.table, error = %failure.error, "table not indexed");
    }
    info!(
        indexed = report.indexed.len(),
        failed = report.failed.len(),
        removed = report.removed.len(),
        "schema index published"
    );
    report.into_result()
}

fn is_current(
    name: &str,
    doc: &SchemaDocument,
    model: &str,
    stored: &BTreeMap<String, EntryFingerprint>,
) -> bool {
    stored
        .get(name)
        .map(|fp| fp.model == model && fp.doc_hash == doc.hash())
        .unwrap_or(false)
}

fn is_selected(
    mode: &IndexMode,
    name: &str,
    doc: &SchemaDocument,
    model: &str,
    stored: &BTreeMap<String, EntryFingerprint>,
) -> bool {
    match mode {
        IndexMode::Rebuild => true,
        IndexMode::Incremental => !is_current(name, doc, model, stored),
        IndexMode::Only(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
    }
}

/// Embed and check the backend honoured the batch contract.
async fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
    let vectors = embedder.embed(texts).await.map_err(|e| format!("{e:#}"))?;
    if vectors.len() != texts.len() {
        return Err(format!(
            "embedding backend returned {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        ));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dims()) {
        return Err(format!(
            "embedding dimension mismatch: expected {}, got {}",
            embedder.dims(),
            v.len()
        ));
    }
    Ok(vectors)
}

fn entry_for(doc: &SchemaDocument, vector: Vec<f32>, model: &str) -> IndexEntry {
    IndexEntry {
        table_name: doc.table_name.clone(),
        vector,
        document: doc.text.clone(),
        doc_hash: doc.hash(),
        model: model.to_string(),
    }
}

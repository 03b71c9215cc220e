//! Catalog and schema index overview.
//!
//! Provides a quick summary of what's indexed: table counts, index
//! coverage, the embedding model, and tables whose index entry is missing
//! or stale. Used by `copilot status` to confirm that `copilot index` is
//! current before asking questions.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use sql_copilot_core::catalog::{Catalog, SchemaDocument};
use sql_copilot_core::store::{EntryFingerprint, SchemaIndex};

use crate::config::Config;
use crate::sqlite_index::SqliteIndex;
use crate::{db, migrate, schema};

/// Index coverage relative to the current catalog.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexCoverage {
    pub tables: usize,
    pub indexed: usize,
    /// Catalog tables with no index entry.
    pub missing: Vec<String>,
    /// Entries whose document or model no longer matches.
    pub stale: Vec<String>,
    /// Entries for tables that no longer exist.
    pub orphaned: Vec<String>,
    pub models: Vec<String>,
}

/// Compare stored fingerprints with freshly rendered documents.
/// `model` is the configured embedding model, when known.
pub fn coverage(
    catalog: &Catalog,
    stored: &BTreeMap<String, EntryFingerprint>,
    model: Option<&str>,
) -> IndexCoverage {
    let mut out = IndexCoverage {
        tables: catalog.len(),
        ..Default::default()
    };

    for table in catalog.tables() {
        match stored.get(&table.name) {
            None => out.missing.push(table.name.clone()),
            Some(fp) => {
                out.indexed += 1;
                let doc_changed = fp.doc_hash != SchemaDocument::render(table).hash();
                let model_changed = model.is_some_and(|m| m != fp.model);
                if doc_changed || model_changed {
                    out.stale.push(table.name.clone());
                }
            }
        }
    }

    out.orphaned = stored
        .keys()
        .filter(|name| catalog.table(name).is_none())
        .cloned()
        .collect();

    let mut models: Vec<String> = stored.values().map(|fp| fp.model.clone()).collect();
    models.sort();
    models.dedup();
    out.models = models;

    out
}

/// Run the status command: query both databases and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let target = db::connect_target(config).await?;
    let catalog = schema::load_catalog(&target).await?;
    target.close().await;

    let index_pool = db::connect_index(config).await?;
    migrate::migrate(&index_pool).await?;
    let index = SqliteIndex::new(index_pool);
    let stored = index.fingerprints().await?;
    index.pool().close().await;

    let configured_model = if config.embedding.is_enabled() {
        config.embedding.model.as_deref()
    } else {
        None
    };
    let cov = coverage(&catalog, &stored, configured_model);

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total_rows: u64 = catalog.tables().iter().map(|t| t.row_count).sum();

    println!("SQL Copilot — Status");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Tables:      {}", cov.tables);
    println!("  Rows:        {}", total_rows);
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!(
        "  Indexed:     {} / {} ({}%)",
        cov.indexed,
        cov.tables,
        if cov.tables > 0 {
            (cov.indexed * 100) / cov.tables
        } else {
            0
        }
    );
    println!(
        "  Embedding:   {}{}",
        config.embedding.provider,
        config
            .embedding
            .model
            .as_deref()
            .map(|m| format!(" ({})", m))
            .unwrap_or_default()
    );
    if !cov.models.is_empty() {
        println!("  Stored with: {}", cov.models.join(", "));
    }
    println!(
        "  Retrieval:   {}",
        if config.synthesis_config().rag_enabled {
            "enabled"
        } else {
            "disabled (full schema in prompts)"
        }
    );

    if !cov.missing.is_empty() {
        println!();
        println!("  Missing from index: {}", cov.missing.join(", "));
    }
    if !cov.stale.is_empty() {
        println!("  Stale in index:     {}", cov.stale.join(", "));
    }
    if !cov.orphaned.is_empty() {
        println!("  Dropped tables:     {}", cov.orphaned.join(", "));
    }
    if !(cov.missing.is_empty() && cov.stale.is_empty() && cov.orphaned.is_empty()) {
        println!();
        println!("  Run `copilot index` to bring the index up to date.");
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sql_copilot_core::catalog::{ColumnDescriptor, TableDescriptor};

    fn table(name: &str) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            columns: vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: "INTEGER".to_string(),
                nullable: false,
                primary_key: true,
            }],
            foreign_keys: Vec::new(),
            row_count: 0,
        }
    }

    fn fingerprint(table: &TableDescriptor, model: &str) -> EntryFingerprint {
        EntryFingerprint {
            doc_hash: SchemaDocument::render(table).hash(),
            model: model.to_string(),
        }
    }

    #[test]
    fn test_coverage_classifies_entries() {
        let catalog = Catalog::new(vec![table("customers"), table("orders"), table("reviews")]);
        let mut stored = BTreeMap::new();
        stored.insert("customers".to_string(), fingerprint(&table("customers"), "m1"));
        stored.insert(
            "orders".to_string(),
            EntryFingerprint {
                doc_hash: "outdated".to_string(),
                model: "m1".to_string(),
            },
        );
        stored.insert("legacy".to_string(), fingerprint(&table("legacy"), "m1"));

        let cov = coverage(&catalog, &stored, Some("m1"));
        assert_eq!(cov.tables, 3);
        assert_eq!(cov.indexed, 2);
        assert_eq!(cov.missing, vec!["reviews"]);
        assert_eq!(cov.stale, vec!["orders"]);
        assert_eq!(cov.orphaned, vec!["legacy"]);
        assert_eq!(cov.models, vec!["m1"]);
    }

    #[test]
    fn test_model_change_marks_everything_stale() {
        let catalog = Catalog::new(vec![table("customers")]);
        let mut stored = BTreeMap::new();
        stored.insert("customers".to_string(), fingerprint(&table("customers"), "old"));
        assert_eq!(coverage(&catalog, &stored, Some("new")).stale, vec!["customers"]);
        assert!(coverage(&catalog, &stored, None).stale.is_empty());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}

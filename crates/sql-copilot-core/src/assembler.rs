//! Context assembly: the schema excerpt placed in the generation prompt.
//!
//! Starting from the retrieved tables, the assembler follows foreign-key
//! edges outward (and optionally inward) for up to `max_fk_hops` hops so
//! the model sees the tables it needs for joins. The excerpt never exceeds
//! `max_tables`.
//!
//! When retrieval is disabled, unavailable, or found nothing relevant, the
//! excerpt is the entire catalog.
//!
//! Rendering is deterministic: retrieved tables in rank order, then the
//! foreign-key additions alphabetically.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{Catalog, TableDescriptor};
use crate::error::RetrievalUnavailable;
use crate::retrieval::RetrievalResult;

/// Foreign-key expansion limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyParams {
    pub max_fk_hops: usize,
    pub max_tables: usize,
    /// Also add tables whose foreign keys point at included tables.
    pub include_referencing_tables: bool,
}

impl Default for AssemblyParams {
    fn default() -> Self {
        Self {
            max_fk_hops: 1,
            max_tables: 12,
            include_referencing_tables: false,
        }
    }
}

/// Why the excerpt is the full catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RetrievalDisabled,
    EmptyIndex,
    RetrievalFailed(String),
    NoRelevantTables,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExcerptSource {
    Retrieved,
    FullCatalog { reason: FallbackReason },
}

/// The bounded schema context for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaExcerpt {
    /// Tables in render order.
    pub tables: Vec<String>,
    /// Subset of `tables` added by foreign-key expansion.
    pub fk_added: Vec<String>,
    pub source: ExcerptSource,
    pub text: String,
}

impl SchemaExcerpt {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ExcerptSource::FullCatalog { .. })
    }
}

/// Build the schema excerpt from a retrieval outcome.
pub fn assemble(
    retrieval: Result<&RetrievalResult, &RetrievalUnavailable>,
    catalog: &Catalog,
    params: &AssemblyParams,
) -> SchemaExcerpt {
    let result = match retrieval {
        Ok(result) => result,
        Err(RetrievalUnavailable::Disabled) => {
            return full_catalog(catalog, FallbackReason::RetrievalDisabled)
        }
        Err(RetrievalUnavailable::EmptyIndex) => {
            return full_catalog(catalog, FallbackReason::EmptyIndex)
        }
        Err(other) => {
            return full_catalog(catalog, FallbackReason::RetrievalFailed(other.to_string()));
        }
    };

    let max_tables = params.max_tables.max(1);
    let mut included: Vec<&TableDescriptor> = Vec::new();
    for candidate in &result.tables {
        // Entries for tables dropped since the last index run are ignored.
        if let Some(table) = catalog.table(&candidate.table_name) {
            if included.len() < max_tables && !included.iter().any(|t| t.name == table.name) {
                included.push(table);
            }
        }
    }
    if included.is_empty() {
        return full_catalog(catalog, FallbackReason::NoRelevantTables);
    }

    let mut fk_added: Vec<&TableDescriptor> = Vec::new();
    let mut frontier: Vec<&TableDescriptor> = included.clone();
    for _hop in 0..params.max_fk_hops {
        if included.len() + fk_added.len() >= max_tables || frontier.is_empty() {
            break;
        }
        let mut next: BTreeSet<&str> = BTreeSet::new();
        for table in &frontier {
            for neighbor in catalog.referenced_tables(&table.name) {
                next.insert(neighbor.name.as_str());
            }
            if params.include_referencing_tables {
                for neighbor in catalog.referencing_tables(&table.name) {
                    next.insert(neighbor.name.as_str());
                }
            }
        }

        let mut added_this_hop = Vec::new();
        for name in next {
            if included.len() + fk_added.len() >= max_tables {
                break;
            }
            let seen = included.iter().chain(fk_added.iter()).any(|t| t.name == name);
            if seen {
                continue;
            }
            if let Some(table) = catalog.table(name) {
                fk_added.push(table);
                added_this_hop.push(table);
            }
        }
        frontier = added_this_hop;
    }
    fk_added.sort_by(|a, b| a.name.cmp(&b.name));

    let ordered: Vec<&TableDescriptor> = included.iter().chain(fk_added.iter()).copied().collect();
    debug!(
        retrieved = included.len(),
        fk_added = fk_added.len(),
        "assembled schema excerpt"
    );
    SchemaExcerpt {
        tables: ordered.iter().map(|t| t.name.clone()).collect(),
        fk_added: fk_added.iter().map(|t| t.name.clone()).collect(),
        source: ExcerptSource::Retrieved,
        text: render_tables(&ordered),
    }
}

fn full_catalog(catalog: &Catalog, reason: FallbackReason) -> SchemaExcerpt {
    debug!(?reason, tables = catalog.len(), "using full catalog as schema excerpt");
    let all: Vec<&TableDescriptor> = catalog.tables().iter().collect();
    SchemaExcerpt {
        tables: catalog.table_names(),
        fk_added: Vec::new(),
        source: ExcerptSource::FullCatalog { reason },
        text: render_tables(&all),
    }
}

/// Prompt rendering of a table list.
pub fn render_tables(tables: &[&TableDescriptor]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for table in tables {
        if !parts.is_empty() {
            parts.push(String::new());
        }
        parts.push(format!("Table: {} ({} rows)", table.name, table.row_count));
        parts.push("Columns:".to_string());
        for col in &table.columns {
            let null = if col.nullable { " NULL" } else { " NOT NULL" };
            let pk = if col.primary_key { " [PRIMARY KEY]" } else { "" };
            parts.push(format!("  - {}: {}{}{}", col.name, col.data_type, null, pk));
        }
        if !table.foreign_keys.is_empty() {
            parts.push("Foreign Keys:".to_string());
            for fk in &table.foreign_keys {
                parts.push(format!(
                    "  - {} -> {}.{}",
                    fk.column, fk.target_table, fk.target_column
                ));
            }
        }
    }
    parts.join("\n")
}

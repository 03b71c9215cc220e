//! Catalog introspection for SQLite databases.
//!
//! Reads table, column, primary-key, and foreign-key metadata plus row
//! counts from the target database and builds a [`Catalog`]. Also backs
//! `copilot schema`, which prints the catalog.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use sql_copilot_core::catalog::{
    Catalog, CatalogHandle, ColumnDescriptor, ForeignKeyEdge, TableDescriptor,
};

use crate::config::Config;
use crate::db;

/// Foreign key as reported by SQLite; `to` is NULL when the key targets the
/// referenced table's primary key implicitly.
struct RawForeignKey {
    from: String,
    table: String,
    to: Option<String>,
}

/// Introspect every user table of the database behind `pool`.
pub async fn load_catalog(pool: &SqlitePool) -> Result<Catalog> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tables")?;

    let mut tables = Vec::with_capacity(names.len());
    let mut raw_fks = Vec::with_capacity(names.len());

    for name in &names {
        let column_rows = sqlx::query(
            r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(name)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", name))?;

        let columns: Vec<ColumnDescriptor> = column_rows
            .iter()
            .map(|row| {
                let data_type: String = row.get("type");
                let not_null: i64 = row.get("notnull");
                let pk: i64 = row.get("pk");
                ColumnDescriptor {
                    name: row.get("name"),
                    data_type: if data_type.is_empty() {
                        "ANY".to_string()
                    } else {
                        data_type
                    },
                    // Primary-key columns are reported as NOT NULL.
                    nullable: not_null == 0 && pk == 0,
                    primary_key: pk > 0,
                }
            })
            .collect();

        let fk_rows = sqlx::query(
            r#"SELECT "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(name)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to read foreign keys of {}", name))?;

        let fks: Vec<RawForeignKey> = fk_rows
            .iter()
            .map(|row| RawForeignKey {
                from: row.get("from"),
                table: row.get("table"),
                to: row.get("to"),
            })
            .collect();

        let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
        let row_count: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(pool)
            .await
            .with_context(|| format!("Failed to count rows of {}", name))?;

        tables.push(TableDescriptor {
            name: name.clone(),
            columns,
            foreign_keys: Vec::new(),
            row_count: row_count.max(0) as u64,
        });
        raw_fks.push(fks);
    }

    let resolved: Vec<Vec<ForeignKeyEdge>> = raw_fks
        .into_iter()
        .map(|fks| {
            fks.into_iter()
                .map(|fk| {
                    let target_column = fk
                        .to
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| primary_key_of(&tables, &fk.table));
                    ForeignKeyEdge {
                        column: fk.from,
                        target_table: fk.table,
                        target_column,
                    }
                })
                .collect()
        })
        .collect();
    for (table, fks) in tables.iter_mut().zip(resolved) {
        table.foreign_keys = fks;
    }

    debug!(tables = tables.len(), "loaded catalog");
    Ok(Catalog::new(tables))
}

/// Reload the catalog and swap it into `handle` if its fingerprint moved.
/// Returns whether the schema changed. In-flight requests keep the
/// snapshot they started with.
pub async fn refresh(handle: &CatalogHandle, pool: &SqlitePool) -> Result<bool> {
    let catalog = load_catalog(pool).await?;
    let before = handle.snapshot().fingerprint();
    let after = catalog.fingerprint();
    if before == after {
        debug!(fingerprint = %after, "catalog unchanged");
        return Ok(false);
    }
    info!(tables = catalog.len(), fingerprint = %after, "catalog changed, swapping snapshot");
    handle.replace(catalog);
    Ok(true)
}

fn primary_key_of(tables: &[TableDescriptor], table: &str) -> String {
    tables
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(table))
        .and_then(|t| t.columns.iter().find(|c| c.primary_key))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "rowid".to_string())
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Run `copilot schema`: print every table with its columns and keys.
pub async fn run_schema(config: &Config, table: Option<&str>) -> Result<()> {
    let pool = db::connect_target(config).await?;
    let catalog = load_catalog(&pool).await?;

    let selected: Vec<&TableDescriptor> = match table {
        Some(name) => match catalog.table(name) {
            Some(t) => vec![t],
            None => anyhow::bail!("Table not found: {}", name),
        },
        None => catalog.tables().iter().collect(),
    };

    println!("Database: {}", config.db.path.display());
    println!("Tables:   {}", catalog.len());

    for t in selected {
        println!();
        println!("{} ({} rows)", t.name, t.row_count);
        for col in &t.columns {
            let mut flags = Vec::new();
            if col.primary_key {
                flags.push("PK");
            }
            if !col.nullable {
                flags.push("NOT NULL");
            }
            println!(
                "  {:<24} {:<12} {}",
                col.name,
                col.data_type,
                flags.join(", ")
            );
        }
        for fk in &t.foreign_keys {
            println!(
                "  FK {} -> {}.{}",
                fk.column, fk.target_table, fk.target_column
            );
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn fixture_pool(dir: &TempDir) -> SqlitePool {
        let pool = db::connect_writable(&dir.path().join("shop.db")).await.unwrap();
        for stmt in [
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers, total REAL)",
            "INSERT INTO customers (name) VALUES ('Ada'), ('Grace')",
            "INSERT INTO orders (customer_id, total) VALUES (1, 9.5)",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn test_load_catalog() {
        let dir = TempDir::new().unwrap();
        let pool = fixture_pool(&dir).await;
        let catalog = load_catalog(&pool).await.unwrap();

        assert_eq!(catalog.table_names(), vec!["customers", "orders"]);

        let customers = catalog.table("customers").unwrap();
        assert_eq!(customers.row_count, 2);
        let id = customers.column("id").unwrap();
        assert!(id.primary_key);
        assert!(!id.nullable);
        assert!(!customers.column("name").unwrap().nullable);
        assert!(customers.column("email").unwrap().nullable);

        let orders = catalog.table("orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].column, "customer_id");
        assert_eq!(orders.foreign_keys[0].target_table, "customers");
        // Implicit target resolves to the primary key.
        assert_eq!(orders.foreign_keys[0].target_column, "id");
    }

    #[tokio::test]
    async fn test_refresh_swaps_snapshot() {
        let dir = TempDir::new().unwrap();
        let pool = fixture_pool(&dir).await;
        let handle = CatalogHandle::new(load_catalog(&pool).await.unwrap());
        let before = handle.snapshot();

        sqlx::query("CREATE TABLE reviews (id INTEGER PRIMARY KEY, rating INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(refresh(&handle, &pool).await.unwrap());

        assert_eq!(before.len(), 2);
        assert_eq!(handle.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_detects_drift_by_fingerprint() {
        let dir = TempDir::new().unwrap();
        let pool = fixture_pool(&dir).await;
        let handle = CatalogHandle::new(load_catalog(&pool).await.unwrap());

        let unchanged = handle.snapshot();
        assert!(!refresh(&handle, &pool).await.unwrap());
        assert!(Arc::ptr_eq(&unchanged, &handle.snapshot()));

        sqlx::query("ALTER TABLE customers ADD COLUMN city TEXT")
            .execute(&pool)
            .await
            .unwrap();
        assert!(refresh(&handle, &pool).await.unwrap());
        assert_ne!(unchanged.fingerprint(), handle.snapshot().fingerprint());
        assert!(handle.snapshot().table("customers").unwrap().has_column("city"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("order items"), "\"order items\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}

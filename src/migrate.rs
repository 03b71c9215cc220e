use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema index tables. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect_index(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per catalog table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_index (
            table_name TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            doc_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schema_index_model ON schema_index(model)")
        .execute(pool)
        .await?;

    Ok(())
}

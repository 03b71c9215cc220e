//! `copilot validate`: run the static validator against the live catalog
//! without calling the model or executing anything.

use anyhow::{bail, Result};

use sql_copilot_core::extract::extract_sql;

use crate::config::Config;
use crate::{db, schema};

pub async fn run_validate(config: &Config, sql: &str) -> Result<()> {
    let pool = db::connect_target(config).await?;
    let catalog = schema::load_catalog(&pool).await?;
    pool.close().await;

    let statement = extract_sql(sql).unwrap_or_else(|| sql.trim().to_string());
    match config.validator().validate(&statement, &catalog) {
        Ok(report) => {
            println!("valid");
            println!("  tables: {}", report.tables.join(", "));
            for w in &report.warnings {
                println!("  warning: {}", w);
            }
            Ok(())
        }
        Err(e) => {
            println!("invalid");
            println!("  {}: {}", e.kind(), e);
            bail!("{}", e)
        }
    }
}

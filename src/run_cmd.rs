//! `copilot run`: validate a hand-written statement and execute it
//! read-only, without involving the language model.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::json;

use crate::ask::print_rows;
use crate::config::Config;
use crate::export::export_rows;
use crate::pipeline::{Pipeline, RunError};

pub async fn run_run(config: &Config, sql: &str, json: bool, output: Option<&Path>) -> Result<()> {
    // Retrieval plays no part here, so no embedder is created.
    let pipeline = Pipeline::open_with_embedder(config, None).await?;
    let result = pipeline.run_sql(sql).await;
    pipeline.close().await;

    let run = match result {
        Ok(run) => run,
        Err(e) => {
            let code = match &e {
                RunError::Invalid(v) => v.kind(),
                RunError::Execution(_) => "execution_failed",
            };
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(
                        &json!({ "error": { "code": code, "message": e.to_string() } })
                    )?
                );
            } else {
                println!("{}", if code == "execution_failed" { "failed" } else { "invalid" });
                println!("  {}: {}", code, e);
            }
            bail!("{}", e);
        }
    };

    if let Some(path) = output {
        export_rows(&run.rows, path)?;
        eprintln!("Exported {} rows to {}", run.rows.rows.len(), path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("tables: {}", run.tables.join(", "));
        for w in &run.warnings {
            println!("warning: {}", w);
        }
        println!();
        print_rows(&run.rows);
    }
    Ok(())
}

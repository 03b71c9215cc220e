//! `copilot index`: embed the catalog into the schema index.
//!
//! Incremental by default (tables whose document and model are unchanged
//! are skipped). `--rebuild` re-embeds everything; `--retry` re-embeds only
//! the named tables, typically the failures of a previous run.

use anyhow::Result;

use sql_copilot_core::error::IndexingError;
use sql_copilot_core::indexer::{IndexBuildReport, IndexMode};

use crate::config::Config;
use crate::pipeline::Pipeline;

pub async fn run_index(
    config: &Config,
    rebuild: bool,
    retry: Vec<String>,
    batch_size_override: Option<usize>,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pipeline = Pipeline::open(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);
    let mode = index_mode(rebuild, retry);

    let result = pipeline.reindex(&mode, batch_size).await;
    pipeline.close().await;

    match result {
        Ok(report) => {
            print_report(&mode, &report);
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.downcast_ref::<IndexingError>() {
                print_report(&mode, &partial.report);
                println!(
                    "  retry with: copilot index --retry {}",
                    partial.report.failed_tables().join(" ")
                );
            }
            Err(e)
        }
    }
}

pub fn index_mode(rebuild: bool, retry: Vec<String>) -> IndexMode {
    if !retry.is_empty() {
        IndexMode::Only(retry)
    } else if rebuild {
        IndexMode::Rebuild
    } else {
        IndexMode::Incremental
    }
}

fn print_report(mode: &IndexMode, report: &IndexBuildReport) {
    let label = match mode {
        IndexMode::Incremental => "index",
        IndexMode::Rebuild => "index rebuild",
        IndexMode::Only(_) => "index retry",
    };
    println!("{}", label);
    println!("  model: {}", report.model);
    println!("  indexed: {}", report.indexed.len());
    println!("  skipped: {}", report.skipped.len());
    println!("  removed: {}", report.removed.len());
    println!("  failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("    {}: {}", failure.table, failure.error);
    }
}

//! `copilot ask` and `copilot retrieve`.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::Value;

use sql_copilot_core::synthesis::{QueryRows, SynthesisOutcome, ValidationVerdict};

use crate::config::Config;
use crate::export::export_rows;
use crate::llm;
use crate::pipeline::Pipeline;

/// Rows printed in table mode; the rest are summarized.
const DISPLAY_ROWS: usize = 50;

/// Run one question through the full pipeline and print the outcome.
pub async fn run_ask(
    config: &Config,
    question: &str,
    no_rag: bool,
    max_rounds: Option<u32>,
    json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let model = llm::create_model(&config.llm)?;
    let pipeline = Pipeline::open(config).await?;
    let request = config.request_config(no_rag.then_some(false), max_rounds);

    let outcome = pipeline.synthesizer(model).synthesize(question, &request).await;
    pipeline.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    match outcome {
        SynthesisOutcome::Success { rows, .. } => {
            if let Some(path) = output {
                export_rows(&rows, path)?;
                eprintln!("Exported {} rows to {}", rows.rows.len(), path.display());
            }
            Ok(())
        }
        SynthesisOutcome::Failure {
            reason, last_error, ..
        } => bail!("{}: {}", reason, last_error),
    }
}

fn print_outcome(outcome: &SynthesisOutcome) {
    match outcome {
        SynthesisOutcome::Success {
            sql,
            explanation,
            confidence,
            attempts,
            rows,
            warnings,
            context,
            ..
        } => {
            println!("--- SQL ---");
            println!("{}", sql);
            println!();
            if let Some(explanation) = explanation {
                println!("{}", explanation);
                println!();
            }
            if let Some(confidence) = confidence {
                println!("confidence: {}", confidence);
            }
            println!(
                "attempts: {}   context: {}{}",
                attempts,
                context.tables.join(", "),
                if context.fallback.is_some() {
                    " (full catalog)"
                } else {
                    ""
                }
            );
            for w in warnings {
                println!("warning: {}", w);
            }
            println!();
            print_rows(rows);
        }
        SynthesisOutcome::Failure {
            reason,
            last_error,
            attempts,
            history,
            ..
        } => {
            println!("--- Failed ({}) ---", reason);
            println!("attempts: {}", attempts);
            println!("last error: {}", last_error);
            for attempt in history {
                let sql = attempt.sql.as_deref().unwrap_or("<no SQL extracted>");
                let verdict = match &attempt.validation {
                    ValidationVerdict::Failed { error } => error.to_string(),
                    ValidationVerdict::Passed { .. } => "passed validation".to_string(),
                    ValidationVerdict::NotRun => "no response".to_string(),
                };
                println!();
                println!("[attempt {}] {}", attempt.attempt, verdict);
                println!("{}", sql);
            }
        }
    }
}

pub(crate) fn print_rows(rows: &QueryRows) {
    if rows.rows.is_empty() {
        println!("No rows.");
        return;
    }

    let shown: Vec<Vec<String>> = rows
        .rows
        .iter()
        .take(DISPLAY_ROWS)
        .map(|r| r.iter().map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = rows.columns.iter().map(|c| c.chars().count()).collect();
    for row in &shown {
        for (i, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(value.chars().count()).min(40);
            }
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", truncate(c, *w), width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(rows.columns.as_slice()));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &shown {
        println!("{}", line(row.as_slice()));
    }

    let hidden = rows.rows.len().saturating_sub(DISPLAY_ROWS);
    if hidden > 0 {
        println!("... {} more rows", hidden);
    }
    println!(
        "({} rows{})",
        rows.rows.len(),
        if rows.truncated { ", truncated" } else { "" }
    );
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Show which tables retrieval picks for a question and the excerpt the
/// model would see.
pub async fn run_retrieve(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let mut request = config.synthesis_config();
    if let Some(k) = top_k {
        request.top_k = k.max(1);
    }

    let (retrieval, excerpt) = pipeline.retrieve(question, &request).await;
    pipeline.close().await;

    if json {
        let body = serde_json::json!({
            "candidates": retrieval.as_ref().map(|r| r.tables.clone()).unwrap_or_default(),
            "unavailable": retrieval.as_ref().err().map(|e| e.to_string()),
            "excerpt": excerpt,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match &retrieval {
        Ok(result) if result.is_empty() => println!("No tables above min_similarity."),
        Ok(result) => {
            for (i, c) in result.tables.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, c.score, c.table_name);
            }
        }
        Err(e) => println!("Retrieval unavailable: {}", e),
    }
    println!();
    if excerpt.is_fallback() {
        println!("--- Schema excerpt (full catalog) ---");
    } else {
        println!(
            "--- Schema excerpt ({} retrieved, {} via foreign keys) ---",
            excerpt.tables.len() - excerpt.fk_added.len(),
            excerpt.fk_added.len()
        );
    }
    println!("{}", excerpt.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_rendering() {
        assert_eq!(cell(&Value::Null), "NULL");
        assert_eq!(cell(&Value::from("Ada")), "Ada");
        assert_eq!(cell(&Value::from(3.5)), "3.5");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long value", 8), "a ver...");
    }
}

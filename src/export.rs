//! `--output` export of result rows to CSV or JSON.
//!
//! The format follows the file extension. JSON is an array of objects keyed
//! by column name; CSV has a header row and leaves NULL cells empty.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use sql_copilot_core::synthesis::QueryRows;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(ExportFormat::Csv),
            Some("json") => Ok(ExportFormat::Json),
            _ => bail!("Export file must be .csv or .json: {}", path.display()),
        }
    }
}

/// Write `rows` to `path`, creating parent directories.
pub fn export_rows(rows: &QueryRows, path: &Path) -> Result<ExportFormat> {
    let format = ExportFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match format {
        ExportFormat::Csv => write_csv(rows, path),
        ExportFormat::Json => write_json(rows, path),
    }
    .with_context(|| format!("Failed to export results to {}", path.display()))?;

    Ok(format)
}

fn write_csv(rows: &QueryRows, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&rows.columns)?;
    for row in &rows.rows {
        writer.write_record(row.iter().map(csv_field))?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_json(rows: &QueryRows, path: &Path) -> Result<()> {
    let records: Vec<Map<String, Value>> = rows
        .rows
        .iter()
        .map(|row| rows.columns.iter().cloned().zip(row.iter().cloned()).collect())
        .collect();
    fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

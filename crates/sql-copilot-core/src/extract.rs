//! Pull one SQL statement out of free-form model output.
//!
//! Models wrap SQL in markdown fences, prefix it with `SQL:`, follow it
//! with an explanation, or emit reasoning in `<think>` blocks. Strategies,
//! first match wins:
//!
//! 1. A fenced block tagged `sql`/`sqlite`, else the first fenced block
//!    that starts with a statement keyword.
//! 2. The lines after a `SQL:` marker, up to `EXPLANATION:`/`CONFIDENCE:`
//!    or a blank line.
//! 3. The first line starting with a statement keyword, up to a blank line.
//!
//! One trailing `;` is removed. Internal semicolons are kept so the
//! validator can reject multi-statement output.
//!
//! The `EXPLANATION:` and `CONFIDENCE:` sections of the response format are
//! read by [`extract_explanation`] and [`extract_confidence`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?(?:</think>|\z)").unwrap());

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_-]*)[^\n]*\n(.*?)(?:```|\z)").unwrap());

static EXPLANATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)EXPLANATION:[ \t]*(.*?)(?:CONFIDENCE:|```|\z)").unwrap()
});

static CONFIDENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CONFIDENCE:\s*([^\n]*)").unwrap());

/// How sure the model says it is about its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

/// Leading keywords that mark the start of a statement, including ones the
/// validator will reject.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "REPLACE",
    "TRUNCATE", "PRAGMA", "ATTACH", "DETACH", "VACUUM", "REINDEX", "EXPLAIN", "VALUES",
];

/// Extract a single SQL statement, or `None` if nothing looks like SQL.
pub fn extract_sql(raw: &str) -> Option<String> {
    let text = THINK_RE.replace_all(raw, "");

    let candidate = from_fence(&text)
        .or_else(|| from_marker(&text))
        .or_else(|| from_first_statement(&text))?;

    let cleaned = finish(&candidate);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// The model's explanation of its query, if the response has one.
pub fn extract_explanation(raw: &str) -> Option<String> {
    let text = THINK_RE.replace_all(raw, "");
    let body = EXPLANATION_RE.captures(&text)?.get(1)?.as_str().trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// The model's self-reported confidence. Anything other than high or low
/// after the marker reads as medium.
pub fn extract_confidence(raw: &str) -> Option<Confidence> {
    let text = THINK_RE.replace_all(raw, "");
    let value = CONFIDENCE_RE.captures(&text)?.get(1)?.as_str().to_ascii_lowercase();
    Some(if value.contains("high") {
        Confidence::High
    } else if value.contains("low") {
        Confidence::Low
    } else {
        Confidence::Medium
    })
}

fn starts_with_statement(text: &str) -> bool {
    let first = text
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or("");
    STATEMENT_KEYWORDS
        .iter()
        .any(|kw| first.eq_ignore_ascii_case(kw))
}

fn from_fence(text: &str) -> Option<String> {
    let mut first_sqlish = None;
    for cap in FENCE_RE.captures_iter(text) {
        let lang = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if body.is_empty() {
            continue;
        }
        if lang.eq_ignore_ascii_case("sql") || lang.eq_ignore_ascii_case("sqlite") {
            return Some(body.to_string());
        }
        if first_sqlish.is_none() && starts_with_statement(body) {
            first_sqlish = Some(body.to_string());
        }
    }
    first_sqlish
}

fn from_marker(text: &str) -> Option<String> {
    let mut lines = text.lines();
    let mut collected: Vec<&str> = Vec::new();

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if let Some(idx) = trimmed.to_ascii_uppercase().find("SQL:") {
            let rest = trimmed[idx + 4..].trim();
            if !rest.is_empty() {
                collected.push(rest);
            }
            break;
        }
    }

    for line in lines {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("EXPLANATION:") || upper.starts_with("CONFIDENCE:") {
            break;
        }
        if trimmed.starts_with("```") {
            continue;
        }
        if trimmed.is_empty() {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        collected.push(line);
    }

    if collected.is_empty() || !starts_with_statement(collected[0]) {
        return None;
    }
    Some(collected.join("\n"))
}

fn from_first_statement(text: &str) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    for line in text.lines() {
        if collected.is_empty() {
            if starts_with_statement(line.trim()) {
                collected.push(line);
            }
            continue;
        }
        if line.trim().is_empty() {
            break;
        }
        collected.push(line);
    }
    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n"))
    }
}

fn finish(sql: &str) -> String {
    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    trimmed.trim_end().to_string()
}

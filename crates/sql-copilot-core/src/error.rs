//! Error kinds of the synthesis pipeline.
//!
//! Each kind maps to a distinct recovery policy in the synthesis loop:
//!
//! | Error | Policy |
//! |-------|--------|
//! | [`ValidationError`] | drives a correction round |
//! | [`ExecutionError::Runtime`] | drives a correction round |
//! | [`ExecutionError::Timeout`], [`GenerationError::Timeout`] | fatal for the request |
//! | [`GenerationError::Unavailable`], [`GenerationError::Backend`] | fatal for the request |
//! | [`RetrievalUnavailable`] | absorbed by the full-catalog fallback |
//! | [`IndexingError`] | reported per table by the indexer |

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::indexer::IndexBuildReport;

/// A static validation failure. The validator reports exactly one of these:
/// the first layer that fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// No SQL statement could be extracted from the model output.
    #[error("unparseable output: no SQL statement found in the model response")]
    UnparseableOutput,

    /// The statement could not be parsed as SQL.
    #[error("syntax error: {message}")]
    SyntaxError { message: String },

    /// The statement's leading keyword is not in the allow-list.
    #[error("disallowed statement type: {keyword} (only {allowed} statements are permitted)")]
    DisallowedStatementType { keyword: String, allowed: String },

    /// A deny-listed keyword or a statement separator appears in the text.
    #[error("dangerous construct: {construct}")]
    DangerousConstruct { construct: String },

    /// A table or column reference does not exist in the catalog.
    #[error("unknown identifier: {identifier}")]
    UnknownIdentifier { identifier: String },
}

impl ValidationError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnparseableOutput => "unparseable_output",
            ValidationError::SyntaxError { .. } => "syntax_error",
            ValidationError::DisallowedStatementType { .. } => "disallowed_statement_type",
            ValidationError::DangerousConstruct { .. } => "dangerous_construct",
            ValidationError::UnknownIdentifier { .. } => "unknown_identifier",
        }
    }
}

/// Failure of the language-model collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model error: {0}")]
    Backend(String),
}

/// Failure of the query-execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// The database rejected the statement (syntax, constraint, runtime).
    #[error("{0}")]
    Runtime(String),
}

/// Why retrieval could not produce a result. Distinct from an empty result,
/// which means "no relevant tables".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalUnavailable {
    #[error("retrieval disabled by configuration")]
    Disabled,

    #[error("schema index is empty")]
    EmptyIndex,

    #[error("embedding backend failed: {0}")]
    Embedding(String),

    #[error("schema index failed: {0}")]
    Store(String),
}

/// Indexing finished with at least one table that could not be embedded or
/// stored. The report lists what succeeded so callers can retry the rest.
#[derive(Debug, Clone, Error)]
#[error("indexing failed for {} table(s): {}", .report.failed.len(), .report.failed_tables().join(", "))]
pub struct IndexingError {
    pub report: IndexBuildReport,
}

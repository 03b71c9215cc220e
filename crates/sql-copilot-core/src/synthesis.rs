//! The generate → validate → correct loop.
//!
//! [`Synthesizer::synthesize`] drives one request through an explicit state
//! machine:
//!
//! ```text
//! RETRIEVING → ASSEMBLING → GENERATING → VALIDATING → EXECUTING → SUCCEEDED
//!                               ▲             │            │
//!                               └─ CORRECTING ◀────────────┘
//!                         (any state) → FAILED
//! ```
//!
//! Validation failures and database runtime errors are fed back to the
//! model through a correction prompt. Timeouts and an unreachable model are
//! fatal. All rounds share one budget, `max_rounds`, which counts the
//! initial attempt.
//!
//! The model and executor are collaborators behind [`LanguageModel`] and
//! [`QueryExecutor`]; implementations enforce the timeouts they are given.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::assembler::{assemble, AssemblyParams, ExcerptSource, FallbackReason, SchemaExcerpt};
use crate::catalog::Catalog;
use crate::corrector::build_correction_prompt;
use crate::embedding::Embedder;
use crate::error::{ExecutionError, GenerationError, RetrievalUnavailable, ValidationError};
use crate::extract::{extract_confidence, extract_explanation, extract_sql, Confidence};
use crate::prompt::generation_prompt;
use crate::retrieval::{retrieve, RetrievalResult};
use crate::store::SchemaIndex;
use crate::validator::{ValidationReport, Validator};

/// Text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`, giving up after `timeout`.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError>;
}

/// Rows returned by a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// More rows existed than the row cap allowed.
    pub truncated: bool,
}

/// Runs validated SQL against the target database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        row_cap: usize,
    ) -> Result<QueryRows, ExecutionError>;
}

/// Per-request settings. Immutable once passed to [`Synthesizer::synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub rag_enabled: bool,
    pub top_k: usize,
    pub min_similarity: f32,
    pub max_fk_hops: usize,
    pub max_tables: usize,
    pub include_referencing_tables: bool,
    /// Total rounds including the first; values below 1 are treated as 1.
    pub max_rounds: u32,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub max_result_rows: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            rag_enabled: true,
            top_k: 5,
            min_similarity: 0.3,
            max_fk_hops: 1,
            max_tables: 12,
            include_referencing_tables: false,
            max_rounds: 3,
            generation_timeout: Duration::from_secs(120),
            execution_timeout: Duration::from_secs(30),
            max_result_rows: 1000,
        }
    }
}

impl SynthesisConfig {
    pub fn assembly_params(&self) -> AssemblyParams {
        AssemblyParams {
            max_fk_hops: self.max_fk_hops,
            max_tables: self.max_tables,
            include_referencing_tables: self.include_referencing_tables,
        }
    }
}

/// Loop states, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynthesisState {
    Retrieving,
    Assembling,
    Generating,
    Validating,
    Executing,
    Correcting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationVerdict {
    NotRun,
    Passed { warnings: Vec<String> },
    Failed { error: ValidationError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionVerdict {
    NotRun,
    Succeeded { row_count: usize, truncated: bool },
    Failed { error: String },
    TimedOut,
}

/// One round of the loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAttempt {
    /// 1-based.
    pub attempt: u32,
    pub prompt: String,
    pub raw_output: String,
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub confidence: Option<Confidence>,
    pub validation: ValidationVerdict,
    pub execution: ExecutionVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ValidationBudgetExhausted,
    ExecutionBudgetExhausted,
    GenerationTimeout,
    ExecutionTimeout,
    ModelUnavailable,
    InvalidRequest,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::ValidationBudgetExhausted => "validation budget exhausted",
            FailureReason::ExecutionBudgetExhausted => "execution budget exhausted",
            FailureReason::GenerationTimeout => "language model timed out",
            FailureReason::ExecutionTimeout => "query execution timed out",
            FailureReason::ModelUnavailable => "language model unavailable",
            FailureReason::InvalidRequest => "invalid request",
        };
        f.write_str(text)
    }
}

/// Which schema the model was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub tables: Vec<String>,
    pub fk_added: Vec<String>,
    /// Set when the full catalog was used instead of retrieved tables.
    pub fallback: Option<FallbackReason>,
}

impl From<&SchemaExcerpt> for ContextSummary {
    fn from(excerpt: &SchemaExcerpt) -> Self {
        let fallback = match &excerpt.source {
            ExcerptSource::Retrieved => None,
            ExcerptSource::FullCatalog { reason } => Some(reason.clone()),
        };
        Self {
            tables: excerpt.tables.clone(),
            fk_added: excerpt.fk_added.clone(),
            fallback,
        }
    }
}

/// Terminal result of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    Success {
        request_id: String,
        sql: String,
        /// The model's own account of the query, when it gave one.
        explanation: Option<String>,
        confidence: Option<Confidence>,
        tables_used: Vec<String>,
        attempts: u32,
        rows: QueryRows,
        warnings: Vec<String>,
        context: ContextSummary,
        history: Vec<QueryAttempt>,
    },
    Failure {
        request_id: String,
        reason: FailureReason,
        last_error: String,
        attempts: u32,
        context: Option<ContextSummary>,
        history: Vec<QueryAttempt>,
    },
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            SynthesisOutcome::Success { attempts, .. }
            | SynthesisOutcome::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn history(&self) -> &[QueryAttempt] {
        match self {
            SynthesisOutcome::Success { history, .. }
            | SynthesisOutcome::Failure { history, .. } => history,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            SynthesisOutcome::Success { request_id, .. }
            | SynthesisOutcome::Failure { request_id, .. } => request_id,
        }
    }
}

/// Everything one request needs. Cheap to build per request from shared `Arc`s.
pub struct Synthesizer {
    pub catalog: Arc<Catalog>,
    /// `None` when no embedding backend is configured; retrieval is then disabled.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub index: Arc<dyn SchemaIndex>,
    pub model: Arc<dyn LanguageModel>,
    pub executor: Arc<dyn QueryExecutor>,
    pub validator: Validator,
}

/// Internal loop state with the data each transition needs.
enum Step {
    Retrieving,
    Assembling(Result<RetrievalResult, RetrievalUnavailable>),
    Generating { prompt: String },
    Validating { prompt: String, raw: String },
    Executing { sql: String, report: ValidationReport },
    Correcting { failed_sql: String, error: String },
    Succeeded { sql: String, report: ValidationReport, rows: QueryRows },
    Failed { reason: FailureReason, error: String },
}

impl Step {
    fn state(&self) -> SynthesisState {
        match self {
            Step::Retrieving => SynthesisState::Retrieving,
            Step::Assembling(_) => SynthesisState::Assembling,
            Step::Generating { .. } => SynthesisState::Generating,
            Step::Validating { .. } => SynthesisState::Validating,
            Step::Executing { .. } => SynthesisState::Executing,
            Step::Correcting { .. } => SynthesisState::Correcting,
            Step::Succeeded { .. } => SynthesisState::Succeeded,
            Step::Failed { .. } => SynthesisState::Failed,
        }
    }
}

impl Synthesizer {
    /// Turn `question` into a validated, executed SQL statement.
    pub async fn synthesize(&self, question: &str, config: &SynthesisConfig) -> SynthesisOutcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("synthesize", request_id = %request_id);
        self.run(request_id, question, config).instrument(span).await
    }

    async fn run(
        &self,
        request_id: String,
        question: &str,
        config: &SynthesisConfig,
    ) -> SynthesisOutcome {
        let question = question.trim();
        let invalid = |msg: &str| SynthesisOutcome::Failure {
            request_id: request_id.clone(),
            reason: FailureReason::InvalidRequest,
            last_error: msg.to_string(),
            attempts: 0,
            context: None,
            history: Vec::new(),
        };
        if question.is_empty() {
            return invalid("question is empty");
        }
        if self.catalog.is_empty() {
            return invalid("the database has no tables");
        }

        let max_rounds = config.max_rounds.max(1);
        let mut attempt: u32 = 0;
        let mut history: Vec<QueryAttempt> = Vec::new();
        let mut excerpt: Option<SchemaExcerpt> = None;
        let mut step = Step::Retrieving;

        info!(question = %question, max_rounds, "synthesis started");

        loop {
            debug!(state = ?step.state(), attempt, "synthesis step");
            step = match step {
                Step::Retrieving => Step::Assembling(self.retrieve(question, config).await),

                Step::Assembling(retrieval) => {
                    if let Err(e) = &retrieval {
                        if *e != RetrievalUnavailable::Disabled {
                            warn!(error = %e, "retrieval unavailable, using full catalog");
                        }
                    }
                    let assembled =
                        assemble(retrieval.as_ref(), &self.catalog, &config.assembly_params());
                    info!(
                        tables = ?assembled.tables,
                        fallback = assembled.is_fallback(),
                        "schema context assembled"
                    );
                    let prompt = generation_prompt(question, &assembled.text);
                    excerpt = Some(assembled);
                    attempt = 1;
                    Step::Generating { prompt }
                }

                Step::Generating { prompt } => {
                    match self.model.generate(&prompt, config.generation_timeout).await {
                        Ok(raw) => Step::Validating { prompt, raw },
                        Err(e) => {
                            history.push(QueryAttempt {
                                attempt,
                                prompt,
                                raw_output: String::new(),
                                sql: None,
                                explanation: None,
                                confidence: None,
                                validation: ValidationVerdict::NotRun,
                                execution: ExecutionVerdict::NotRun,
                            });
                            let reason = match e {
                                GenerationError::Timeout(_) => FailureReason::GenerationTimeout,
                                _ => FailureReason::ModelUnavailable,
                            };
                            Step::Failed {
                                reason,
                                error: e.to_string(),
                            }
                        }
                    }
                }

                Step::Validating { prompt, raw } => {
                    let sql = extract_sql(&raw);
                    let verdict = match &sql {
                        None => Err(ValidationError::UnparseableOutput),
                        Some(sql) => self
                            .validator
                            .validate(sql, &self.catalog)
                            .map(|report| (sql.clone(), report)),
                    };
                    let failed_sql = sql.clone().unwrap_or_else(|| raw.clone());
                    history.push(QueryAttempt {
                        attempt,
                        prompt,
                        explanation: extract_explanation(&raw),
                        confidence: extract_confidence(&raw),
                        raw_output: raw,
                        sql,
                        validation: match &verdict {
                            Ok((_, report)) => ValidationVerdict::Passed {
                                warnings: report.warnings.clone(),
                            },
                            Err(error) => ValidationVerdict::Failed { error: error.clone() },
                        },
                        execution: ExecutionVerdict::NotRun,
                    });

                    match verdict {
                        Ok((sql, report)) => Step::Executing { sql, report },
                        Err(error) => {
                            let error = error.to_string();
                            warn!(attempt, sql = %failed_sql, error = %error, "validation failed");
                            if attempt < max_rounds {
                                Step::Correcting { failed_sql, error }
                            } else {
                                Step::Failed {
                                    reason: FailureReason::ValidationBudgetExhausted,
                                    error,
                                }
                            }
                        }
                    }
                }

                Step::Executing { sql, report } => {
                    let result = self
                        .executor
                        .execute(&sql, config.execution_timeout, config.max_result_rows)
                        .await;
                    let verdict = match &result {
                        Ok(rows) => ExecutionVerdict::Succeeded {
                            row_count: rows.rows.len(),
                            truncated: rows.truncated,
                        },
                        Err(ExecutionError::Timeout(_)) => ExecutionVerdict::TimedOut,
                        Err(e) => ExecutionVerdict::Failed { error: e.to_string() },
                    };
                    if let Some(last) = history.last_mut() {
                        last.execution = verdict;
                    }
                    match result {
                        Ok(rows) => Step::Succeeded { sql, report, rows },
                        Err(e @ ExecutionError::Timeout(_)) => {
                            warn!(attempt, sql = %sql, error = %e, "execution timed out");
                            Step::Failed {
                                reason: FailureReason::ExecutionTimeout,
                                error: e.to_string(),
                            }
                        }
                        Err(e) => {
                            let error = e.to_string();
                            warn!(attempt, sql = %sql, error = %error, "execution failed");
                            if attempt < max_rounds {
                                Step::Correcting { failed_sql: sql, error }
                            } else {
                                Step::Failed {
                                    reason: FailureReason::ExecutionBudgetExhausted,
                                    error,
                                }
                            }
                        }
                    }
                }

                Step::Correcting { failed_sql, error } => {
                    attempt += 1;
                    let excerpt_text = excerpt.as_ref().map(|e| e.text.as_str()).unwrap_or("");
                    Step::Generating {
                        prompt: build_correction_prompt(
                            question,
                            excerpt_text,
                            &failed_sql,
                            &error,
                        ),
                    }
                }

                Step::Succeeded { sql, report, rows } => {
                    info!(attempts = attempt, rows = rows.rows.len(), "synthesis succeeded");
                    let context = excerpt
                        .as_ref()
                        .map(ContextSummary::from)
                        .unwrap_or_else(|| ContextSummary {
                            tables: Vec::new(),
                            fk_added: Vec::new(),
                            fallback: None,
                        });
                    let (explanation, confidence) = history
                        .last()
                        .map(|a| (a.explanation.clone(), a.confidence))
                        .unwrap_or_default();
                    return SynthesisOutcome::Success {
                        request_id,
                        sql,
                        explanation,
                        confidence,
                        tables_used: report.tables,
                        attempts: attempt,
                        rows,
                        warnings: report.warnings,
                        context,
                        history,
                    };
                }

                Step::Failed { reason, error } => {
                    warn!(attempts = attempt, reason = %reason, error = %error, "synthesis failed");
                    return SynthesisOutcome::Failure {
                        request_id,
                        reason,
                        last_error: error,
                        attempts: attempt,
                        context: excerpt.as_ref().map(ContextSummary::from),
                        history,
                    };
                }
            };
        }
    }

    async fn retrieve(
        &self,
        question: &str,
        config: &SynthesisConfig,
    ) -> Result<RetrievalResult, RetrievalUnavailable> {
        if !config.rag_enabled {
            return Err(RetrievalUnavailable::Disabled);
        }
        let Some(embedder) = self.embedder.as_deref() else {
            return Err(RetrievalUnavailable::Disabled);
        };
        retrieve(
            question,
            config.top_k,
            config.min_similarity,
            embedder,
            self.index.as_ref(),
        )
        .await
    }
}

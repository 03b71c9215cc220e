//! HTTP server.
//!
//! Exposes the SQL Copilot pipeline as a JSON HTTP API so editors, notebooks,
//! and chat front-ends can ask questions without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/schema` | Full catalog snapshot |
//! | `GET`  | `/schema/{table}` | One table descriptor |
//! | `POST` | `/query` | Question → validated, executed SQL |
//! | `POST` | `/retrieve` | Question → retrieved tables and schema excerpt |
//! | `POST` | `/validate` | Static validation of a SQL statement |
//! | `POST` | `/execute` | Validate a SQL statement, then run it read-only |
//! | `POST` | `/explain` | Plain-language explanation of a SQL statement |
//! | `POST` | `/index` | Refresh the catalog and update the schema index |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embeddings_disabled` (400),
//! `timeout` (408), `internal` (500). `/execute` also answers 422 with the
//! validation error kind (for example `unknown_identifier`) or
//! `execution_failed`.
//!
//! A synthesis request that runs out of rounds is not an HTTP error: it
//! returns `200` with `"status": "failure"` and the full attempt history.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use sql_copilot_core::assembler::SchemaExcerpt;
use sql_copilot_core::catalog::{Catalog, TableDescriptor};
use sql_copilot_core::error::{ExecutionError, GenerationError, IndexingError};
use sql_copilot_core::extract::extract_sql;
use sql_copilot_core::indexer::IndexBuildReport;
use sql_copilot_core::store::TableCandidate;
use sql_copilot_core::synthesis::{FailureReason, LanguageModel, SynthesisOutcome};

use crate::config::Config;
use crate::explain::explain_sql;
use crate::index_cmd::index_mode;
use crate::llm;
use crate::pipeline::{DirectRun, Pipeline, RunError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub model: Arc<dyn LanguageModel>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind`. The server runs
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let model = llm::create_model(&config.llm)?;
    let pipeline = Pipeline::open(config).await?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        model,
    };

    let bind_addr = config.server.bind.clone();
    println!("SQL Copilot listening on http://{}", bind_addr);
    info!(bind = %bind_addr, llm = state.model.model_name(), "server starting");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the router. Split out of [`run_server`] so tests can serve it on
/// an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/schema", get(handle_schema))
        .route("/schema/{table}", get(handle_table))
        .route("/query", post(handle_query))
        .route("/retrieve", post(handle_retrieve))
        .route("/validate", post(handle_validate))
        .route("/execute", post(handle_execute))
        .route("/explain", post(handle_explain))
        .route("/index", post(handle_index))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn embeddings_disabled(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "embeddings_disabled".to_string(),
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

fn unprocessable(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: code.to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /schema ============

async fn handle_schema(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.pipeline.catalog.snapshot().as_ref().clone())
}

async fn handle_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<TableDescriptor>, AppError> {
    let catalog = state.pipeline.catalog.snapshot();
    catalog
        .table(&table)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no such table: {}", table)))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    /// Overrides `[retrieval].rag_enabled` for this request.
    rag_enabled: Option<bool>,
    max_rounds: Option<u32>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<SynthesisOutcome>, AppError> {
    let request = state
        .pipeline
        .config
        .request_config(req.rag_enabled, req.max_rounds);
    let outcome = state
        .pipeline
        .synthesizer(state.model.clone())
        .synthesize(&req.question, &request)
        .await;

    if let SynthesisOutcome::Failure {
        reason: FailureReason::InvalidRequest,
        last_error,
        ..
    } = &outcome
    {
        return Err(bad_request(last_error.clone()));
    }
    Ok(Json(outcome))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    question: String,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    candidates: Vec<TableCandidate>,
    /// Why retrieval fell back to the full catalog, if it did.
    unavailable: Option<String>,
    excerpt: SchemaExcerpt,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let mut request = state.pipeline.config.synthesis_config();
    if let Some(k) = req.top_k {
        request.top_k = k.max(1);
    }
    let (retrieval, excerpt) = state.pipeline.retrieve(&req.question, &request).await;
    Ok(Json(RetrieveResponse {
        candidates: retrieval
            .as_ref()
            .map(|r| r.tables.clone())
            .unwrap_or_default(),
        unavailable: retrieval.err().map(|e| e.to_string()),
        excerpt,
    }))
}

// ============ POST /validate ============

#[derive(Deserialize)]
struct SqlRequest {
    sql: String,
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    sql: String,
    tables: Vec<String>,
    warnings: Vec<String>,
    error: Option<ErrorDetail>,
}

async fn handle_validate(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    if req.sql.trim().is_empty() {
        return Err(bad_request("sql must not be empty"));
    }
    let sql = extract_sql(&req.sql).unwrap_or_else(|| req.sql.trim().to_string());
    let catalog = state.pipeline.catalog.snapshot();
    let response = match state.pipeline.validator.validate(&sql, &catalog) {
        Ok(report) => ValidateResponse {
            valid: true,
            sql,
            tables: report.tables,
            warnings: report.warnings,
            error: None,
        },
        Err(e) => ValidateResponse {
            valid: false,
            sql,
            tables: Vec::new(),
            warnings: Vec::new(),
            error: Some(ErrorDetail {
                code: e.kind().to_string(),
                message: e.to_string(),
            }),
        },
    };
    Ok(Json(response))
}

// ============ POST /execute ============

async fn handle_execute(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<DirectRun>, AppError> {
    if req.sql.trim().is_empty() {
        return Err(bad_request("sql must not be empty"));
    }
    match state.pipeline.run_sql(&req.sql).await {
        Ok(run) => Ok(Json(run)),
        Err(RunError::Invalid(e)) => Err(unprocessable(e.kind(), e.to_string())),
        Err(RunError::Execution(e @ ExecutionError::Timeout(_))) => {
            Err(timeout_error(e.to_string()))
        }
        Err(RunError::Execution(e)) => Err(unprocessable("execution_failed", e.to_string())),
    }
}

// ============ POST /explain ============

#[derive(Serialize)]
struct ExplainResponse {
    explanation: String,
}

async fn handle_explain(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<ExplainResponse>, AppError> {
    if req.sql.trim().is_empty() {
        return Err(bad_request("sql must not be empty"));
    }
    let timeout = Duration::from_secs(state.pipeline.config.synthesis.generation_timeout_secs);
    let explanation = explain_sql(state.model.as_ref(), &req.sql, timeout)
        .await
        .map_err(|e| match e.downcast_ref::<GenerationError>() {
            Some(GenerationError::Timeout(_)) => timeout_error(e.to_string()),
            _ => internal(e.to_string()),
        })?;
    Ok(Json(ExplainResponse { explanation }))
}

// ============ POST /index ============

#[derive(Deserialize, Default)]
struct IndexRequest {
    #[serde(default)]
    rebuild: bool,
    #[serde(default)]
    tables: Vec<String>,
}

#[derive(Serialize)]
struct IndexResponse {
    complete: bool,
    /// The refresh found a different schema than the one being served.
    catalog_changed: bool,
    report: IndexBuildReport,
}

async fn handle_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, AppError> {
    if state.pipeline.embedder.is_none() {
        return Err(embeddings_disabled(
            "embedding provider is disabled; set [embedding] provider in config",
        ));
    }

    let catalog_changed = state
        .pipeline
        .refresh_catalog()
        .await
        .map_err(|e| internal(e.to_string()))?;

    let mode = index_mode(req.rebuild, req.tables);
    let batch_size = state.pipeline.config.embedding.batch_size;
    match state.pipeline.reindex(&mode, batch_size).await {
        Ok(report) => Ok(Json(IndexResponse {
            complete: true,
            catalog_changed,
            report,
        })),
        Err(e) => match e.downcast::<IndexingError>() {
            Ok(partial) => {
                warn!(failed = ?partial.report.failed_tables(), "index incomplete");
                Ok(Json(IndexResponse {
                    complete: false,
                    catalog_changed,
                    report: partial.report,
                }))
            }
            Err(e) => Err(internal(e.to_string())),
        },
    }
}

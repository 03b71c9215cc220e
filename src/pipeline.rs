//! Wiring of the core pipeline to SQLite, the schema index, and the
//! configured embedding provider.
//!
//! A [`Pipeline`] is opened once per process (CLI command or server) and
//! hands out a [`Synthesizer`] per request. The catalog lives behind a
//! [`CatalogHandle`]; a refresh swaps the snapshot without affecting
//! requests already in flight.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use sql_copilot_core::assembler::{assemble, SchemaExcerpt};
use sql_copilot_core::catalog::CatalogHandle;
use sql_copilot_core::embedding::Embedder;
use sql_copilot_core::error::{ExecutionError, RetrievalUnavailable, ValidationError};
use sql_copilot_core::extract::extract_sql;
use sql_copilot_core::indexer::{index_catalog, IndexBuildReport, IndexMode};
use sql_copilot_core::retrieval::{retrieve, RetrievalResult};
use sql_copilot_core::synthesis::{
    LanguageModel, QueryExecutor, QueryRows, SynthesisConfig, Synthesizer,
};
use sql_copilot_core::validator::Validator;

use crate::config::Config;
use crate::execute::SqliteExecutor;
use crate::sqlite_index::SqliteIndex;
use crate::{db, embedding, migrate, schema};

/// A hand-written statement that passed validation and ran.
#[derive(Debug, Clone, Serialize)]
pub struct DirectRun {
    pub sql: String,
    pub tables: Vec<String>,
    pub warnings: Vec<String>,
    pub rows: QueryRows,
}

/// Why [`Pipeline::run_sql`] returned no rows.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub struct Pipeline {
    pub config: Config,
    pub catalog: CatalogHandle,
    pub target: SqlitePool,
    pub index: Arc<SqliteIndex>,
    /// `None` when `[embedding] provider = "disabled"`.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub executor: Arc<SqliteExecutor>,
    pub validator: Validator,
}

impl Pipeline {
    /// Open the target database and schema index, load the catalog, and
    /// create the configured embedding provider.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = embedding::create_optional(&config.embedding)?;
        Self::open_with_embedder(config, embedder).await
    }

    pub async fn open_with_embedder(
        config: &Config,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let target = db::connect_target(config).await?;
        let catalog = schema::load_catalog(&target).await?;

        let index_pool = db::connect_index(config).await?;
        migrate::migrate(&index_pool).await?;

        info!(
            tables = catalog.len(),
            embedder = embedder.as_ref().map(|e| e.model_name()).unwrap_or("disabled"),
            "pipeline ready"
        );

        Ok(Self {
            config: config.clone(),
            catalog: CatalogHandle::new(catalog),
            executor: Arc::new(SqliteExecutor::new(target.clone())),
            target,
            index: Arc::new(SqliteIndex::new(index_pool)),
            embedder,
            validator: config.validator(),
        })
    }

    /// A synthesizer over the current catalog snapshot.
    pub fn synthesizer(&self, model: Arc<dyn LanguageModel>) -> Synthesizer {
        Synthesizer {
            catalog: self.catalog.snapshot(),
            embedder: self.embedder.clone(),
            index: self.index.clone(),
            model,
            executor: self.executor.clone(),
            validator: self.validator.clone(),
        }
    }

    /// Validate `sql` against the current catalog and run it with the
    /// configured timeout and row cap. Nothing reaches the database unless
    /// validation passes. Fenced or `SQL:`-prefixed input is unwrapped first.
    pub async fn run_sql(&self, sql: &str) -> Result<DirectRun, RunError> {
        let statement = extract_sql(sql).unwrap_or_else(|| sql.trim().to_string());
        let catalog = self.catalog.snapshot();
        let report = self.validator.validate(&statement, &catalog).inspect_err(|e| {
            warn!(sql = %statement, error = %e, "statement rejected");
        })?;

        let config = self.config.synthesis_config();
        let rows = self
            .executor
            .execute(&statement, config.execution_timeout, config.max_result_rows)
            .await?;
        info!(rows = rows.rows.len(), truncated = rows.truncated, "statement executed");

        Ok(DirectRun {
            sql: statement,
            tables: report.tables,
            warnings: report.warnings,
            rows,
        })
    }

    /// Re-read the target database's schema. Returns whether it changed.
    pub async fn refresh_catalog(&self) -> Result<bool> {
        schema::refresh(&self.catalog, &self.target).await
    }

    /// Index the current catalog. A partial failure is returned as an
    /// [`IndexingError`](sql_copilot_core::error::IndexingError) inside the
    /// `anyhow::Error`, carrying the report.
    pub async fn reindex(&self, mode: &IndexMode, batch_size: usize) -> Result<IndexBuildReport> {
        let Some(embedder) = &self.embedder else {
            bail!("Embedding provider is disabled. Set [embedding] provider in config.");
        };
        let catalog = self.catalog.snapshot();
        let report = index_catalog(
            &catalog,
            embedder.as_ref(),
            self.index.as_ref(),
            mode,
            batch_size,
        )
        .await?;
        Ok(report)
    }

    /// Retrieval and assembly alone, as the synthesis loop would run them.
    pub async fn retrieve(
        &self,
        question: &str,
        config: &SynthesisConfig,
    ) -> (Result<RetrievalResult, RetrievalUnavailable>, SchemaExcerpt) {
        let catalog = self.catalog.snapshot();
        let retrieval = match (&self.embedder, config.rag_enabled) {
            (Some(embedder), true) => {
                retrieve(
                    question,
                    config.top_k,
                    config.min_similarity,
                    embedder.as_ref(),
                    self.index.as_ref(),
                )
                .await
            }
            _ => Err(RetrievalUnavailable::Disabled),
        };
        let excerpt = assemble(retrieval.as_ref(), &catalog, &config.assembly_params());
        (retrieval, excerpt)
    }

    pub async fn close(self) {
        self.index.pool().close().await;
        self.target.close().await;
    }
}

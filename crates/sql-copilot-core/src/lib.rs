//! # SQL Copilot Core
//!
//! Schema-aware retrieval and query synthesis for SQL Copilot: the catalog
//! model, schema index abstraction, relevance retrieval, context assembly,
//! static SQL validation, and the generate → validate → correct loop.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The
//! language model, embedding backend, query executor, and persistent index
//! are collaborators supplied by the application through the traits in
//! [`embedding`], [`store`], and [`synthesis`].
//!
//! ```text
//! question ─▶ retrieval ─▶ assembler ─▶ synthesis loop ─▶ SynthesisOutcome
//!                 ▲                        │      ▲
//!            SchemaIndex             validator   corrector
//!                 ▲                        │
//!              indexer ◀── Catalog         ▼
//!                                   QueryExecutor
//! ```

pub mod assembler;
pub mod catalog;
pub mod corrector;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod synthesis;
pub mod validator;

//! # SQL Copilot
//!
//! Ask questions about a SQLite database in plain language and get back
//! validated, executed SQL.
//!
//! The schema of the target database is introspected into a catalog, each
//! table is embedded into a schema index, and for every question only the
//! relevant tables (plus their foreign-key neighbours) are shown to the
//! language model. Generated SQL is statically validated against the
//! catalog before it runs; validation and execution errors are fed back to
//! the model for a bounded number of correction rounds.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  SQLite  │──▶│   Catalog    │──▶│ Schema index │
//! │ (target) │   │ (introspect) │   │  (embedded)  │
//! └────┬─────┘   └──────┬───────┘   └──────┬───────┘
//!      │                ▼                  │
//!      │        ┌───────────────┐          │
//!      │        │  Synthesizer  │◀─────────┘
//!      │        │ retrieve → generate → validate → execute
//!      │        └───────┬───────┘
//!      │      ┌─────────┴─────────┐
//!      └─────▶▼                   ▼
//!        ┌──────────┐       ┌──────────┐
//!        │   CLI    │       │   HTTP   │
//!        │(copilot) │       │  (JSON)  │
//!        └──────────┘       └──────────┘
//! ```
//!
//! The storage-independent parts (catalog, retrieval, assembly, validation,
//! the synthesis loop) live in the `sql-copilot-core` crate. This crate
//! wires them to SQLite, HTTP model backends, the CLI, and the server.
//!
//! ## Quick Start
//!
//! ```bash
//! copilot sample-db                  # create an e-commerce sample database
//! copilot init                       # create the schema index
//! copilot index                      # embed every table
//! copilot ask "top 5 customers by total spend"
//! copilot serve                      # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connections |
//! | [`migrate`] | Schema index migrations |
//! | [`schema`] | Catalog introspection |
//! | [`sqlite_index`] | SQLite-backed schema index |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model backends |
//! | [`execute`] | Bounded query execution |
//! | [`pipeline`] | Per-process wiring of the above |
//! | [`ask`] | `ask` and `retrieve` commands |
//! | [`index_cmd`] | `index` command |
//! | [`validate_cmd`] | `validate` command |
//! | [`run_cmd`] | `run` command |
//! | [`export`] | CSV and JSON export of result rows |
//! | [`explain`] | `explain` command |
//! | [`status`] | `status` command |
//! | [`sample`] | `sample-db` command |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod execute;
pub mod explain;
pub mod export;
pub mod index_cmd;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod run_cmd;
pub mod sample;
pub mod schema;
pub mod server;
pub mod sqlite_index;
pub mod status;
pub mod validate_cmd;

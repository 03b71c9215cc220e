//! # SQL Copilot CLI (`copilot`)
//!
//! ## Usage
//!
//! ```bash
//! copilot --config ./config/copilot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `copilot sample-db` | Create the e-commerce sample database |
//! | `copilot init` | Create the schema index database |
//! | `copilot index` | Embed the catalog into the schema index |
//! | `copilot schema [table]` | Print the introspected schema |
//! | `copilot retrieve "<question>"` | Show which tables retrieval picks |
//! | `copilot ask "<question>"` | Generate, validate, and run SQL |
//! | `copilot validate "<sql>"` | Validate SQL against the catalog |
//! | `copilot run "<sql>"` | Validate SQL and run it read-only |
//! | `copilot explain "<sql>"` | Explain SQL in plain language |
//! | `copilot status` | Catalog and index coverage |
//! | `copilot serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sql_copilot::{
    ask, config, explain, index_cmd, logging, migrate, run_cmd, sample, schema, server, status,
    validate_cmd,
};

/// Natural-language questions over a SQLite database.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/copilot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "copilot",
    about = "SQL Copilot — schema-aware natural-language queries over SQLite",
    version,
    long_about = "SQL Copilot retrieves the tables relevant to a question from an embedded \
    schema index, asks a language model for SQL, validates it against the live catalog, \
    and executes it read-only, correcting failed attempts for a bounded number of rounds."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/copilot.toml")]
    config: PathBuf,

    /// Log progress at info level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a small e-commerce sample database.
    ///
    /// Writes to `--path`, or to `[db].path` from the config when it loads,
    /// or to `./data/ecommerce.db`.
    SampleDb {
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Create the schema index database.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Embed the catalog into the schema index.
    ///
    /// Incremental by default: tables whose schema and embedding model are
    /// unchanged are skipped.
    Index {
        /// Re-embed every table.
        #[arg(long)]
        rebuild: bool,

        /// Re-embed only these tables (e.g. the failures of a previous run).
        #[arg(long, num_args = 1..)]
        retry: Vec<String>,

        /// Override `[embedding].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print the introspected schema.
    Schema {
        /// Show a single table.
        table: Option<String>,
    },

    /// Show which tables retrieval picks for a question.
    Retrieve {
        question: String,

        /// Override `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Turn a question into SQL, validate it, and run it.
    Ask {
        question: String,

        /// Show the whole catalog to the model instead of retrieved tables.
        #[arg(long)]
        no_rag: bool,

        /// Override `[synthesis].max_rounds`.
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Print the full outcome, including attempt history, as JSON.
        #[arg(long)]
        json: bool,

        /// Also write the result rows to a `.csv` or `.json` file.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Validate a SQL statement against the catalog without running it.
    Validate { sql: String },

    /// Validate a SQL statement and run it read-only.
    Run {
        sql: String,

        #[arg(long)]
        json: bool,

        /// Also write the result rows to a `.csv` or `.json` file.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Explain a SQL statement in plain language.
    Explain { sql: String },

    /// Catalog size and schema index coverage.
    Status,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Works without a config file.
    if let Commands::SampleDb { path, force } = &cli.command {
        let loaded = config::load_config(&cli.config).ok();
        logging::init(
            cli.verbose,
            loaded.as_ref().map(|c| c.logging.level.as_str()),
        );
        let path = path
            .clone()
            .or_else(|| loaded.map(|c| c.db.path))
            .unwrap_or_else(|| PathBuf::from("./data/ecommerce.db"));
        sample::run_sample_db(&path, *force).await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(cli.verbose, Some(&cfg.logging.level));

    match cli.command {
        Commands::SampleDb { .. } => unreachable!(),
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Schema index initialized: {}", cfg.index.path.display());
        }
        Commands::Index {
            rebuild,
            retry,
            batch_size,
        } => {
            index_cmd::run_index(&cfg, rebuild, retry, batch_size).await?;
        }
        Commands::Schema { table } => {
            schema::run_schema(&cfg, table.as_deref()).await?;
        }
        Commands::Retrieve {
            question,
            top_k,
            json,
        } => {
            ask::run_retrieve(&cfg, &question, top_k, json).await?;
        }
        Commands::Ask {
            question,
            no_rag,
            max_rounds,
            json,
            output,
        } => {
            ask::run_ask(&cfg, &question, no_rag, max_rounds, json, output.as_deref()).await?;
        }
        Commands::Validate { sql } => {
            validate_cmd::run_validate(&cfg, &sql).await?;
        }
        Commands::Run { sql, json, output } => {
            run_cmd::run_run(&cfg, &sql, json, output.as_deref()).await?;
        }
        Commands::Explain { sql } => {
            explain::run_explain(&cfg, &sql).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

//! Command-line surface: one subcommand per verb in `SPEC_FULL.md` §6.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dbforge", version, about = "A lightweight, framework-agnostic database schema migration tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database connection URL. Overrides `DATABASE_URL`.
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Directory containing migration files. Overrides `DBMATE_MIGRATIONS_DIR`.
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Path to write the schema dump to. Overrides `DBMATE_SCHEMA_FILE`.
    #[arg(long, global = true)]
    pub schema_file: Option<PathBuf>,

    /// Name of the table tracking applied migrations. Overrides `DBMATE_MIGRATIONS_TABLE`.
    #[arg(long, global = true)]
    pub migrations_table: Option<String>,

    /// How strictly to compare a migration's recorded checksum against its current
    /// on-disk contents: none, lenient, or strict.
    #[arg(long, global = true)]
    pub checksum_mode: Option<String>,

    /// Disable writing the schema dump after `up`/`migrate`/`rollback`.
    #[arg(long, global = true)]
    pub no_dump_schema: bool,

    /// Load environment variables from this file instead of `.env`.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Path to an optional project config file.
    #[arg(long, global = true, default_value = ".dbmate.toml")]
    pub config_file: PathBuf,

    /// Print every applied/rolled-back statement as it runs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Seconds to wait for `wait`/`create`/`up` to reach a connectable database.
    #[arg(long, global = true)]
    pub wait_timeout: Option<u64>,

    /// Before `create`/`migrate`/`up`, block until the database is reachable instead
    /// of failing immediately.
    #[arg(long, global = true)]
    pub wait: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new, empty migration file.
    New { name: String },
    /// Create the database if it doesn't exist, then run `migrate`.
    Up,
    /// Create the database named in the connection URL.
    Create,
    /// Drop the database named in the connection URL.
    Drop,
    /// Apply every migration that hasn't been applied yet.
    Migrate,
    /// Roll back the most recently applied migration.
    Rollback,
    /// List every migration and whether it has been applied.
    Status {
        /// Exit with the number of pending migrations instead of 0.
        #[arg(long)]
        exit_code: bool,
    },
    /// Write the current schema to the schema file without migrating.
    Dump,
    /// Block until the database accepts connections, or until the wait timeout elapses.
    Wait,
}

//! Resolves an [`EngineConfig`] from CLI flags, environment variables, and an optional
//! project config file, in that order of precedence.
//!
//! The file layer uses `serde`+`toml` against a flat scalar config struct; `dotenvy`
//! loads a `.env` file ahead of argument parsing, per `SPEC_FULL.md` §10.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dbforge_core::{ChecksumMode, EngineConfig};
use serde::Deserialize;

use crate::cli::Cli;

/// The optional `.dbmate.toml` project file. Every field is optional; only present
/// fields override the built-in defaults, and CLI flags/env vars still win over this.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    migrations_dir: Option<PathBuf>,
    schema_file: Option<PathBuf>,
    migrations_table: Option<String>,
    no_dump_schema: Option<bool>,
}

fn read_file_config(path: &std::path::Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("could not parse config file {}", path.display()))
}

/// Load `.env` (if present) and build an [`EngineConfig`] from `cli`, the process
/// environment, and `.dbmate.toml`.
pub fn resolve(cli: &Cli) -> Result<EngineConfig> {
    if let Some(env_file) = &cli.env_file {
        dotenvy::from_path(env_file).ok();
    } else {
        dotenvy::dotenv().ok();
    }

    let file_config = read_file_config(&cli.config_file)?;

    let database_url = cli
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("no database URL given: pass --url or set DATABASE_URL")?;

    let migrations_dir = cli
        .migrations_dir
        .clone()
        .or_else(|| std::env::var("DBMATE_MIGRATIONS_DIR").ok().map(PathBuf::from))
        .or(file_config.migrations_dir)
        .unwrap_or_else(|| PathBuf::from("./db/migrations"));

    let schema_file = cli
        .schema_file
        .clone()
        .or_else(|| std::env::var("DBMATE_SCHEMA_FILE").ok().map(PathBuf::from))
        .or(file_config.schema_file)
        .unwrap_or_else(|| PathBuf::from("./db/schema.sql"));

    let migrations_table = cli
        .migrations_table
        .clone()
        .or_else(|| std::env::var("DBMATE_MIGRATIONS_TABLE").ok())
        .or(file_config.migrations_table)
        .unwrap_or_else(|| "schema_migrations".to_string());

    let no_dump_schema = cli.no_dump_schema
        || env_flag("DBMATE_NO_DUMP_SCHEMA")
        || file_config.no_dump_schema.unwrap_or(false);

    let verbose = cli.verbose || env_flag("DBMATE_VERBOSE");

    let wait_timeout = cli
        .wait_timeout
        .or_else(|| {
            std::env::var("DBMATE_WAIT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
        })
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60));

    let checksum_mode = cli
        .checksum_mode
        .as_deref()
        .map(str::parse::<ChecksumMode>)
        .transpose()
        .context("invalid --checksum-mode")?
        .unwrap_or(ChecksumMode::None);

    let mut config = EngineConfig::new(database_url)
        .with_migrations_dir(migrations_dir)
        .with_schema_file(schema_file)
        .with_migrations_table_name(migrations_table)
        .with_auto_dump_schema(!no_dump_schema)
        .with_verbose(verbose)
        .with_wait_before(cli.wait)
        .with_wait_timeout(wait_timeout);
    config.driver = config.driver.with_checksum_mode(checksum_mode);

    Ok(config)
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

//! Core migration engine: file discovery and parsing, checksums, the driver contract,
//! and the five built-in database drivers, behind a thin [`Engine`] facade.
//!
//! A dependency-light library crate with feature-gated per-database modules,
//! re-exporting the pieces a caller needs without requiring the CLI.

pub mod checksum;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fs;
pub mod migration;
pub mod parser;

pub use crate::checksum::ChecksumMode;
pub use crate::config::{DriverConfig, EngineConfig, LogSink};
pub use crate::driver::{driver_for, register_driver, AppliedMigration, Connection, Driver};
pub use crate::engine::Engine;
pub use crate::error::{Error, WrapContext};
pub use crate::fs::{MemoryMigrationSource, MigrationSource, OsMigrationSource};
pub use crate::migration::Migration;
pub use crate::parser::{BlockOptions, ParsedMigration};

#[cfg(feature = "postgres")]
pub use postgres;

#[cfg(feature = "mysql")]
pub use mysql;

#[cfg(feature = "sqlite")]
pub use rusqlite;

#[cfg(feature = "clickhouse")]
pub use clickhouse;

#[cfg(feature = "bigquery")]
pub use gcp_bigquery_client;

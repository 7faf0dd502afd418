//! The driver contract (C4) and the process-wide URL-scheme registry.
//!
//! `SPEC_FULL.md` §9 calls for real dynamic dispatch keyed by URL scheme string,
//! registered at binary-initialization time: a `HashMap<&str, Ctor>` behind a `Mutex`,
//! lazily seeded on first use.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use time::OffsetDateTime;

use crate::config::DriverConfig;
use crate::error::Error;

pub mod dsn;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "clickhouse")]
pub mod clickhouse;
#[cfg(feature = "bigquery")]
pub mod bigquery;

/// One row of the applied-migrations ledger, as read back by `select_migrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: String,
    pub checksum: Option<String>,
}

/// A connection opened by a [`Driver`]. All methods operate against the ledger table
/// named by the caller; the connection does not remember a table name across calls so
/// that a single connection could in principle serve more than one migrations table.
///
/// Transactions are explicit (`begin`/`commit`/`rollback`) rather than implicit so the
/// engine (C6), not the driver, decides whether a given migration block runs inside
/// one — per `SPEC_FULL.md` §4.6, that decision is per-migration (`transaction:false`),
/// not per-driver. Drivers that cannot run DDL transactionally (ClickHouse, BigQuery)
/// implement `begin`/`commit`/`rollback` as no-ops and document the weakened
/// guarantee in their module doc comment.
pub trait Connection: Send {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error>;

    /// Idempotently create the ledger table.
    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error>;

    /// `limit < 0` means no limit. Implementations order descending by version so a
    /// `limit = 1` call yields the most recently applied migration.
    fn select_migrations(&mut self, table: &str, limit: i64) -> Result<Vec<AppliedMigration>, Error>;

    fn insert_migration(
        &mut self,
        table: &str,
        version: &str,
        checksum: Option<&str>,
    ) -> Result<(), Error>;

    /// Remove (or, for engines without row deletion, tombstone) the applied record.
    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error>;

    /// Execute a raw SQL block (the migration's up or down text, directive line
    /// included — it is a valid SQL comment).
    fn execute(&mut self, sql: &str) -> Result<(), Error>;

    fn begin(&mut self) -> Result<(), Error>;
    fn commit(&mut self) -> Result<(), Error>;
    fn rollback(&mut self) -> Result<(), Error>;
}

/// The per-engine contract the migration engine depends on (C4). Every supported
/// database implements exactly this surface; the engine treats them uniformly.
pub trait Driver: Send + Sync {
    /// Probe that the server is reachable. May create the target file as a side
    /// effect for file-backed engines (SQLite) — documented per driver.
    fn ping(&self) -> Result<(), Error>;

    /// Create the database named in the URL. Idempotence is not required.
    fn create_database(&self) -> Result<(), Error>;

    /// Drop the database if present; silently succeed if absent.
    fn drop_database(&self) -> Result<(), Error>;

    /// Distinguish "no such database" from auth/other errors.
    fn database_exists(&self) -> Result<bool, Error>;

    /// Open a connection to the target database (not the server default database).
    fn open(&self) -> Result<Box<dyn Connection>, Error>;

    /// Produce the full schema dump plus the standard migrations ledger block.
    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error>;
}

pub(crate) fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&time::format_description::well_known::Rfc3339)
        .expect("OffsetDateTime always formats as RFC3339")
}

type Ctor = fn(&DriverConfig) -> Result<Box<dyn Driver>, Error>;

fn registry() -> &'static Mutex<HashMap<&'static str, Ctor>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, Ctor>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, Ctor> = HashMap::new();
        register_builtin_drivers(&mut map);
        Mutex::new(map)
    })
}

fn register_builtin_drivers(map: &mut HashMap<&'static str, Ctor>) {
    #[cfg(feature = "postgres")]
    {
        map.insert("postgres", postgres::connect);
        map.insert("postgresql", postgres::connect);
    }
    #[cfg(feature = "mysql")]
    {
        map.insert("mysql", mysql::connect);
    }
    #[cfg(feature = "sqlite")]
    {
        map.insert("sqlite", sqlite::connect);
        map.insert("sqlite3", sqlite::connect);
    }
    #[cfg(feature = "clickhouse")]
    {
        map.insert("clickhouse", clickhouse::connect);
    }
    #[cfg(feature = "bigquery")]
    {
        map.insert("bigquery", bigquery::connect);
    }
}

/// Register an additional driver constructor under `scheme`, overwriting any existing
/// registration. Not intended to race with lookups — see `SPEC_FULL.md` §9.
pub fn register_driver(scheme: &'static str, ctor: Ctor) {
    registry().lock().expect("driver registry poisoned").insert(scheme, ctor);
}

/// Look up and construct the driver for `config.database_url`'s scheme.
pub fn driver_for(config: DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let scheme = dsn::url_scheme(&config.database_url)?;
    let ctor = {
        let reg = registry().lock().expect("driver registry poisoned");
        reg.get(scheme.as_str()).copied()
    };
    match ctor {
        Some(ctor) => ctor(&config),
        None => Err(Error::UnsupportedDriver(scheme)),
    }
}

//! SQLite driver.
//!
//! A plain synchronous `rusqlite::Connection` wrapped directly, transactions via
//! `Connection::transaction()`, timestamps stored as RFC3339 text and parsed back with
//! `time`.

use std::process::Command;

use rusqlite::Connection as RqlConnection;
use time::OffsetDateTime;

use crate::config::DriverConfig;
use crate::error::{Error, WrapContext};

use super::dsn::{quote_identifier, QuoteStyle};
use super::{format_rfc3339, AppliedMigration, Connection, Driver};

pub fn connect(config: &DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let path = config
        .database_url
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(&config.database_url)
        .to_string();
    Ok(Box::new(SqliteDriver { path }))
}

struct SqliteDriver {
    path: String,
}

impl Driver for SqliteDriver {
    fn ping(&self) -> Result<(), Error> {
        RqlConnection::open(&self.path).driver_err()?;
        Ok(())
    }

    /// SQLite has no server-level "create database" step; opening the path for the
    /// first time creates the file, which is exactly `ping`'s side effect.
    fn create_database(&self) -> Result<(), Error> {
        self.ping()
    }

    fn drop_database(&self) -> Result<(), Error> {
        if std::path::Path::new(&self.path).exists() {
            std::fs::remove_file(&self.path).map_err(|source| Error::ReadFailed {
                path: self.path.clone().into(),
                source,
            })?;
        }
        Ok(())
    }

    fn database_exists(&self) -> Result<bool, Error> {
        Ok(std::path::Path::new(&self.path).exists())
    }

    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let conn = RqlConnection::open(&self.path).driver_err()?;
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error> {
        let output = Command::new("sqlite3")
            .arg(&self.path)
            .arg(".schema")
            .output()
            .map_err(|source| Error::ReadFailed {
                path: "sqlite3".into(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::driver(std::io::Error::other(format!(
                "sqlite3 .schema exited with status {}",
                output.status
            ))));
        }

        let mut dump = output.stdout;
        dump.extend_from_slice(b"\n-- Dbforge schema migrations\n\n");
        for migration in applied {
            dump.extend_from_slice(format!("INSERT INTO schema_migrations VALUES('{}');\n", migration.version).as_bytes());
        }
        Ok(dump)
    }
}

struct SqliteConnection {
    conn: RqlConnection,
}

impl Connection for SqliteConnection {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |_| Ok(()),
            )
            .is_ok();
        Ok(exists)
    }

    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error> {
        let table = quote_identifier(table, QuoteStyle::Ansi);
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL, checksum TEXT)"
            ))
            .driver_err()
    }

    fn select_migrations(&mut self, table: &str, limit: i64) -> Result<Vec<AppliedMigration>, Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        let query = if limit < 0 {
            format!("SELECT version, checksum FROM {quoted} ORDER BY version DESC")
        } else {
            format!("SELECT version, checksum FROM {quoted} ORDER BY version DESC LIMIT {limit}")
        };

        let mut stmt = self.conn.prepare(&query).driver_err()?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get(0)?,
                    checksum: row.get(1)?,
                })
            })
            .driver_err()?;

        let mut applied = Vec::new();
        for row in rows {
            applied.push(row.driver_err()?);
        }
        Ok(applied)
    }

    fn insert_migration(&mut self, table: &str, version: &str, checksum: Option<&str>) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        let now = format_rfc3339(OffsetDateTime::now_utc());
        self.conn
            .execute(
                &format!("INSERT INTO {quoted} (version, applied_at, checksum) VALUES (?1, ?2, ?3)"),
                rusqlite::params![version, now, checksum],
            )
            .driver_err()?;
        Ok(())
    }

    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        self.conn
            .execute(&format!("DELETE FROM {quoted} WHERE version = ?1"), [version])
            .driver_err()?;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql).driver_err()
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("BEGIN").driver_err()
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT").driver_err()
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("ROLLBACK").driver_err()
    }
}

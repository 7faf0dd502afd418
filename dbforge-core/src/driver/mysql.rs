//! MySQL/MariaDB driver.
//!
//! The synchronous `mysql` crate's `Conn` plus the `Queryable` trait. Transactions are
//! plain `START TRANSACTION`/`COMMIT`/`ROLLBACK` statements, since the engine (C6) owns
//! the begin/commit/rollback decision across `execute` calls rather than the driver
//! bundling them into one call.

use std::process::Command;

use mysql::prelude::Queryable;
use mysql::{Conn, Opts};
use time::OffsetDateTime;

use crate::config::DriverConfig;
use crate::error::{Error, WrapContext};

use super::dsn::{mysql_dsn, quote_identifier, ParsedUrl, QuoteStyle};
use super::{format_rfc3339, AppliedMigration, Connection, Driver};

pub fn connect(config: &DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let parsed = ParsedUrl::parse(&config.database_url)?;
    Ok(Box::new(MysqlDriver { parsed }))
}

struct MysqlDriver {
    parsed: ParsedUrl,
}

impl MysqlDriver {
    fn opts_for(&self, database: &str) -> Result<Opts, Error> {
        let mut admin = ParsedUrl {
            scheme: self.parsed.scheme.clone(),
            username: self.parsed.username.clone(),
            password: self.parsed.password.clone(),
            host: self.parsed.host.clone(),
            port: self.parsed.port,
            path: database.to_string(),
            query: self.parsed.query.clone(),
        };
        admin.path = database.to_string();
        Opts::from_url(&mysql_dsn(&admin)).map_err(Error::driver)
    }

    fn target_database(&self) -> &str {
        &self.parsed.path
    }
}

impl Driver for MysqlDriver {
    fn ping(&self) -> Result<(), Error> {
        Conn::new(self.opts_for(self.target_database())?).driver_err()?;
        Ok(())
    }

    fn create_database(&self) -> Result<(), Error> {
        let mut admin = Conn::new(self.opts_for("mysql")?).driver_err()?;
        let quoted = quote_identifier(self.target_database(), QuoteStyle::Backtick);
        admin
            .query_drop(format!("CREATE DATABASE {quoted}"))
            .driver_err()
    }

    fn drop_database(&self) -> Result<(), Error> {
        let mut admin = Conn::new(self.opts_for("mysql")?).driver_err()?;
        let quoted = quote_identifier(self.target_database(), QuoteStyle::Backtick);
        let _ = admin.query_drop(format!("DROP DATABASE IF EXISTS {quoted}"));
        Ok(())
    }

    fn database_exists(&self) -> Result<bool, Error> {
        let mut admin = Conn::new(self.opts_for("mysql")?).driver_err()?;
        let row: Option<String> = admin
            .exec_first(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name = ?",
                (self.target_database(),),
            )
            .driver_err()?;
        Ok(row.is_some())
    }

    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let conn = Conn::new(self.opts_for(self.target_database())?).driver_err()?;
        Ok(Box::new(MysqlConnection { conn }))
    }

    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error> {
        let output = Command::new("mysqldump")
            .arg("--no-data")
            .arg("--skip-comments")
            .arg("--skip-add-locks")
            .arg("--compact")
            .arg(self.target_database())
            .output()
            .map_err(|source| Error::ReadFailed {
                path: "mysqldump".into(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::driver(std::io::Error::other(format!(
                "mysqldump exited with status {}",
                output.status
            ))));
        }

        let dump = strip_auto_increment(&String::from_utf8_lossy(&output.stdout));
        let mut dump = dump.into_bytes();
        dump.extend_from_slice(b"\n-- Dbforge schema migrations\n\n");
        for migration in applied {
            dump.extend_from_slice(
                format!("INSERT INTO `schema_migrations` (version) VALUES ('{}');\n", migration.version).as_bytes(),
            );
        }
        Ok(dump)
    }
}

/// `mysqldump` embeds the next auto-increment counter in the `CREATE TABLE` statement,
/// which would make every dump diff even when the schema itself hasn't changed.
fn strip_auto_increment(dump: &str) -> String {
    static AUTO_INCREMENT: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = AUTO_INCREMENT.get_or_init(|| regex::Regex::new(r"\s*AUTO_INCREMENT=\d+").unwrap());
    re.replace_all(dump, "").into_owned()
}

struct MysqlConnection {
    conn: Conn,
}

impl Connection for MysqlConnection {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let row: Option<String> = self
            .conn
            .exec_first(
                "SELECT table_name FROM information_schema.tables WHERE table_name = ? AND table_schema = DATABASE()",
                (table,),
            )
            .driver_err()?;
        Ok(row.is_some())
    }

    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Backtick);
        self.conn
            .query_drop(format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (version VARCHAR(255) PRIMARY KEY, applied_at VARCHAR(64) NOT NULL, checksum VARCHAR(64))"
            ))
            .driver_err()
    }

    fn select_migrations(&mut self, table: &str, limit: i64) -> Result<Vec<AppliedMigration>, Error> {
        let quoted = quote_identifier(table, QuoteStyle::Backtick);
        let query = if limit < 0 {
            format!("SELECT version, checksum FROM {quoted} ORDER BY version DESC")
        } else {
            format!("SELECT version, checksum FROM {quoted} ORDER BY version DESC LIMIT {limit}")
        };
        let rows: Vec<(String, Option<String>)> = self.conn.query(query).driver_err()?;
        Ok(rows
            .into_iter()
            .map(|(version, checksum)| AppliedMigration { version, checksum })
            .collect())
    }

    fn insert_migration(&mut self, table: &str, version: &str, checksum: Option<&str>) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Backtick);
        let now = format_rfc3339(OffsetDateTime::now_utc());
        self.conn
            .exec_drop(
                format!("INSERT INTO {quoted} (version, applied_at, checksum) VALUES (?, ?, ?)"),
                (version, now, checksum),
            )
            .driver_err()
    }

    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Backtick);
        self.conn
            .exec_drop(format!("DELETE FROM {quoted} WHERE version = ?"), (version,))
            .driver_err()
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.conn.query_drop(stmt).driver_err()?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.conn.query_drop("START TRANSACTION").driver_err()
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.conn.query_drop("COMMIT").driver_err()
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.conn.query_drop("ROLLBACK").driver_err()
    }
}

//! PostgreSQL driver.
//!
//! The synchronous `postgres` crate, `Client::transaction()` for transactional blocks,
//! `simple_query` for non-transactional ones.

use std::process::Command;

use postgres::{Client as PgClient, NoTls};
use time::OffsetDateTime;

use crate::config::DriverConfig;
use crate::error::{Error, WrapContext};

use super::dsn::{postgres_dsn, quote_identifier, split_schema_qualified, ParsedUrl, QuoteStyle};
use super::{format_rfc3339, AppliedMigration, Connection, Driver};

pub fn connect(config: &DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let parsed = ParsedUrl::parse(&config.database_url)?;
    Ok(Box::new(PostgresDriver { parsed }))
}

struct PostgresDriver {
    parsed: ParsedUrl,
}

impl PostgresDriver {
    fn admin_dsn(&self) -> String {
        let mut admin = ParsedUrl {
            scheme: self.parsed.scheme.clone(),
            username: self.parsed.username.clone(),
            password: self.parsed.password.clone(),
            host: self.parsed.host.clone(),
            port: self.parsed.port,
            path: "postgres".to_string(),
            query: self.parsed.query.clone(),
        };
        admin.path = "postgres".to_string();
        postgres_dsn(&admin)
    }

    fn target_database(&self) -> &str {
        &self.parsed.path
    }
}

impl Driver for PostgresDriver {
    fn ping(&self) -> Result<(), Error> {
        PgClient::connect(&postgres_dsn(&self.parsed), NoTls).driver_err()?;
        Ok(())
    }

    fn create_database(&self) -> Result<(), Error> {
        let mut admin = PgClient::connect(&self.admin_dsn(), NoTls).driver_err()?;
        let quoted = quote_identifier(self.target_database(), QuoteStyle::Ansi);
        admin
            .execute(&format!("CREATE DATABASE {quoted}"), &[])
            .driver_err()?;
        Ok(())
    }

    fn drop_database(&self) -> Result<(), Error> {
        let mut admin = PgClient::connect(&self.admin_dsn(), NoTls).driver_err()?;
        let quoted = quote_identifier(self.target_database(), QuoteStyle::Ansi);
        let _ = admin.execute(&format!("DROP DATABASE IF EXISTS {quoted}"), &[]);
        Ok(())
    }

    fn database_exists(&self) -> Result<bool, Error> {
        let mut admin = PgClient::connect(&self.admin_dsn(), NoTls).driver_err()?;
        let row = admin
            .query_opt(
                "SELECT 1 FROM pg_database WHERE datname = $1",
                &[&self.target_database()],
            )
            .driver_err()?;
        Ok(row.is_some())
    }

    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let client = PgClient::connect(&postgres_dsn(&self.parsed), NoTls).driver_err()?;
        Ok(Box::new(PostgresConnection { client }))
    }

    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error> {
        let output = Command::new("pg_dump")
            .arg("--schema-only")
            .arg("--no-owner")
            .arg("--no-privileges")
            .arg(&postgres_dsn(&self.parsed))
            .output()
            .map_err(|source| Error::ReadFailed {
                path: "pg_dump".into(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::driver(std::io::Error::other(format!(
                "pg_dump exited with status {}",
                output.status
            ))));
        }

        let dump = strip_pg_dump_noise(&String::from_utf8_lossy(&output.stdout));
        let mut dump = dump.into_bytes();
        dump.extend_from_slice(b"\n\n-- Dbforge schema migrations\n\n");
        for migration in applied {
            dump.extend_from_slice(
                format!("INSERT INTO public.schema_migrations (version) VALUES ('{}');\n", migration.version).as_bytes(),
            );
        }
        Ok(dump)
    }
}

/// Drop `pg_dump`'s leading comment banner (host/version noise that makes the dump
/// non-reproducible across machines) and the `\restrict`/`\unrestrict` markers newer
/// `pg_dump` versions emit around untrusted input.
fn strip_pg_dump_noise(dump: &str) -> String {
    let mut in_header = true;
    dump.lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with("\\restrict") || trimmed.starts_with("\\unrestrict") {
                return false;
            }
            if in_header {
                if trimmed.is_empty() || trimmed.starts_with("--") {
                    return false;
                }
                in_header = false;
            }
            true
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct PostgresConnection {
    client: PgClient,
}

impl Connection for PostgresConnection {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let (schema, table) = split_schema_qualified(table);
        let row = self
            .client
            .query_opt(
                "SELECT 1 FROM information_schema.tables WHERE table_name = $1 AND table_schema = COALESCE($2, current_schema())",
                &[&table, &schema],
            )
            .driver_err()?;
        Ok(row.is_some())
    }

    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        self.client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (version text PRIMARY KEY, applied_at text NOT NULL, checksum text)"
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
        let rows = self.client.query(&query, &[]).driver_err()?;
        Ok(rows
            .into_iter()
            .map(|row| AppliedMigration {
                version: row.get(0),
                checksum: row.get(1),
            })
            .collect())
    }

    fn insert_migration(&mut self, table: &str, version: &str, checksum: Option<&str>) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        let now = format_rfc3339(OffsetDateTime::now_utc());
        self.client
            .execute(
                &format!("INSERT INTO {quoted} (version, applied_at, checksum) VALUES ($1, $2, $3)"),
                &[&version, &now, &checksum],
            )
            .driver_err()?;
        Ok(())
    }

    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::Ansi);
        self.client
            .execute(&format!("DELETE FROM {quoted} WHERE version = $1"), &[&version])
            .driver_err()?;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.client.batch_execute(sql).driver_err()
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.client.batch_execute("BEGIN").driver_err()
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.client.batch_execute("COMMIT").driver_err()
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.client.batch_execute("ROLLBACK").driver_err()
    }
}

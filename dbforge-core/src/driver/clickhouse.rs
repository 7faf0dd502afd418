//! ClickHouse driver.
//!
//! ClickHouse only ships official async clients; the `clickhouse` crate (a maintained
//! HTTP-based client) is wrapped behind a private single-threaded `tokio` runtime so
//! the rest of the engine can stay synchronous: wrap an async client, drive it to
//! completion one call at a time, with the blocking boundary sitting here instead of
//! the trait itself being `async_trait`, per `SPEC_FULL.md` §5.
//!
//! Transactions are not supported by ClickHouse DDL; `begin`/`commit`/`rollback` are
//! no-ops, and a failed mid-migration statement leaves prior statements applied.

use clickhouse::Client as ChClient;
use tokio::runtime::{Builder, Runtime};

use crate::config::DriverConfig;
use crate::error::{Error, WrapContext};

use super::dsn::{clickhouse_dsn, quote_identifier, QuoteStyle};
use super::{format_rfc3339, AppliedMigration, Connection, Driver};

fn runtime() -> Result<Runtime, Error> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::driver)
}

pub fn connect(config: &DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let dsn = clickhouse_dsn(&super::dsn::ParsedUrl::parse(&config.database_url)?);
    // The `clickhouse` crate speaks HTTP, not the native TCP protocol; translate the
    // native-style `tcp://` DSN this module builds into the http(s) base url it wants.
    let http_url = dsn.replacen("tcp://", "http://", 1);
    let (base, database) = http_url
        .rsplit_once('/')
        .ok_or_else(|| Error::InvalidUrl(dsn.clone()))?;

    let (auth, hostport) = base
        .trim_start_matches("http://")
        .split_once('@')
        .ok_or_else(|| Error::InvalidUrl(dsn.clone()))?;
    let (user, password) = auth.split_once(':').unwrap_or((auth, ""));

    Ok(Box::new(ClickHouseDriver {
        base_url: format!("http://{hostport}"),
        user: user.to_string(),
        password: password.to_string(),
        database: database.to_string(),
    }))
}

struct ClickHouseDriver {
    base_url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseDriver {
    fn client_for(&self, database: &str) -> ChClient {
        ChClient::default()
            .with_url(&self.base_url)
            .with_user(&self.user)
            .with_password(&self.password)
            .with_database(database)
    }
}

impl Driver for ClickHouseDriver {
    fn ping(&self) -> Result<(), Error> {
        let rt = runtime()?;
        let client = self.client_for(&self.database);
        rt.block_on(async { client.query("SELECT 1").execute().await })
            .driver_err()
    }

    fn create_database(&self) -> Result<(), Error> {
        let rt = runtime()?;
        let client = self.client_for("default");
        let quoted = quote_identifier(&self.database, QuoteStyle::ClickHouse);
        rt.block_on(async {
            client
                .query(&format!("CREATE DATABASE IF NOT EXISTS {quoted}"))
                .execute()
                .await
        })
        .driver_err()
    }

    fn drop_database(&self) -> Result<(), Error> {
        let rt = runtime()?;
        let client = self.client_for("default");
        let quoted = quote_identifier(&self.database, QuoteStyle::ClickHouse);
        rt.block_on(async {
            client
                .query(&format!("DROP DATABASE IF EXISTS {quoted}"))
                .execute()
                .await
        })
        .driver_err()
    }

    fn database_exists(&self) -> Result<bool, Error> {
        let rt = runtime()?;
        let client = self.client_for("default");
        let database = self.database.clone();
        let count: u64 = rt
            .block_on(async {
                client
                    .query("SELECT count() FROM system.databases WHERE name = ?")
                    .bind(&database)
                    .fetch_one()
                    .await
            })
            .driver_err()?;
        Ok(count > 0)
    }

    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let rt = runtime()?;
        Ok(Box::new(ClickHouseConnection {
            client: self.client_for(&self.database),
            rt,
        }))
    }

    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error> {
        let rt = runtime()?;
        let client = self.client_for(&self.database);
        let database = self.database.clone();
        let tables: Vec<String> = rt
            .block_on(async {
                client
                    .query("SELECT name FROM system.tables WHERE database = ? ORDER BY name")
                    .bind(&database)
                    .fetch_all()
                    .await
            })
            .driver_err()?;

        let mut dump = Vec::new();
        for table in &tables {
            let ddl: String = rt
                .block_on(async {
                    client
                        .query("SELECT create_table_query FROM system.tables WHERE database = ? AND name = ?")
                        .bind(&database)
                        .bind(table)
                        .fetch_one()
                        .await
                })
                .driver_err()?;
            dump.extend_from_slice(ddl.as_bytes());
            dump.extend_from_slice(b";\n\n");
        }

        dump.extend_from_slice(b"-- Dbforge schema migrations\n\n");
        for migration in applied {
            dump.extend_from_slice(
                format!("INSERT INTO schema_migrations (version, checksum) VALUES ('{}', '{}');\n", migration.version, migration.checksum.as_deref().unwrap_or("")).as_bytes(),
            );
        }
        Ok(dump)
    }
}

struct ClickHouseConnection {
    client: ChClient,
    rt: Runtime,
}

impl Connection for ClickHouseConnection {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let table = table.to_string();
        let client = &self.client;
        let count: u64 = self
            .rt
            .block_on(async {
                client
                    .query("SELECT count() FROM system.tables WHERE database = currentDatabase() AND name = ?")
                    .bind(&table)
                    .fetch_one()
                    .await
            })
            .driver_err()?;
        Ok(count > 0)
    }

    /// Uses `ReplacingMergeTree` keyed on version, since ClickHouse's `MergeTree`
    /// family has no row-level delete; `delete_migration` inserts a tombstone row
    /// instead of removing anything, and reads must always go through `FINAL`.
    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::ClickHouse);
        let client = &self.client;
        self.rt
            .block_on(async {
                client
                    .query(&format!(
                        "CREATE TABLE IF NOT EXISTS {quoted} (
                            version String,
                            applied_at String,
                            checksum String,
                            deleted UInt8
                        ) ENGINE = ReplacingMergeTree(applied_at)
                        ORDER BY version"
                    ))
                    .execute()
                    .await
            })
            .driver_err()
    }

    fn select_migrations(&mut self, table: &str, limit: i64) -> Result<Vec<AppliedMigration>, Error> {
        let quoted = quote_identifier(table, QuoteStyle::ClickHouse);
        let query = if limit < 0 {
            format!("SELECT version, checksum FROM {quoted} FINAL WHERE deleted = 0 ORDER BY version DESC")
        } else {
            format!(
                "SELECT version, checksum FROM {quoted} FINAL WHERE deleted = 0 ORDER BY version DESC LIMIT {limit}"
            )
        };
        let client = &self.client;
        let rows: Vec<(String, String)> = self
            .rt
            .block_on(async { client.query(&query).fetch_all().await })
            .driver_err()?;
        Ok(rows
            .into_iter()
            .map(|(version, checksum)| AppliedMigration {
                version,
                checksum: if checksum.is_empty() { None } else { Some(checksum) },
            })
            .collect())
    }

    fn insert_migration(&mut self, table: &str, version: &str, checksum: Option<&str>) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::ClickHouse);
        let now = format_rfc3339(time::OffsetDateTime::now_utc());
        let checksum = checksum.unwrap_or("").to_string();
        let version = version.to_string();
        let client = &self.client;
        self.rt
            .block_on(async {
                let mut insert = client.insert(&quoted)?;
                insert
                    .write(&(version, now, checksum, 0u8))
                    .await?;
                insert.end().await
            })
            .driver_err()
    }

    /// No row deletion; writes a tombstone that `select_migrations` filters out.
    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error> {
        let quoted = quote_identifier(table, QuoteStyle::ClickHouse);
        let now = format_rfc3339(time::OffsetDateTime::now_utc());
        let version = version.to_string();
        let client = &self.client;
        self.rt
            .block_on(async {
                let mut insert = client.insert(&quoted)?;
                insert
                    .write(&(version, now, String::new(), 1u8))
                    .await?;
                insert.end().await
            })
            .driver_err()
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        let client = &self.client;
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.rt
                .block_on(async { client.query(stmt).execute().await })
                .driver_err()?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

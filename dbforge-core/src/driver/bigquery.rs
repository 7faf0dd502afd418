//! BigQuery driver.
//!
//! BigQuery has no native driver for Rust at all, only the REST API; `gcp-bigquery-client`
//! wraps that API in an async client, so this follows the same private-runtime pattern as
//! [`super::clickhouse`]. Authentication is via Application Default Credentials, resolved
//! by the client itself from the environment (`GOOGLE_APPLICATION_CREDENTIALS`) — nothing
//! here parses credentials directly.
//!
//! BigQuery has no transactions for DDL and no row deletion in the append-only sense
//! `DELETE` normally implies (a `DELETE` against a streaming buffer fails); like
//! ClickHouse this ledger is tombstone-based. `begin`/`commit`/`rollback` are no-ops.

use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::Client as BqClient;
use tokio::runtime::{Builder, Runtime};

use crate::config::DriverConfig;
use crate::error::{Error, WrapContext};

use super::dsn::ParsedUrl;
use super::{format_rfc3339, AppliedMigration, Connection, Driver};

fn runtime() -> Result<Runtime, Error> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::driver)
}

/// `bigquery://<project>/<dataset>` — BigQuery has no server to point at, so the "url"
/// only carries the two identifiers the REST API needs on every call.
pub fn connect(config: &DriverConfig) -> Result<Box<dyn Driver>, Error> {
    let parsed = ParsedUrl::parse(&config.database_url)?;
    let project_id = parsed
        .host
        .clone()
        .ok_or_else(|| Error::InvalidUrl(config.database_url.clone()))?;
    if parsed.path.is_empty() {
        return Err(Error::InvalidUrl(config.database_url.clone()));
    }
    Ok(Box::new(BigQueryDriver {
        project_id,
        dataset_id: parsed.path,
    }))
}

struct BigQueryDriver {
    project_id: String,
    dataset_id: String,
}

impl BigQueryDriver {
    async fn connect_client() -> Result<BqClient, Error> {
        BqClient::from_application_default_credentials()
            .await
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))
    }
}

impl Driver for BigQueryDriver {
    fn ping(&self) -> Result<(), Error> {
        let rt = runtime()?;
        rt.block_on(async {
            let client = BigQueryDriver::connect_client().await?;
            client
                .dataset()
                .get(&self.project_id, &self.dataset_id)
                .await
                .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;
            Ok(())
        })
    }

    fn create_database(&self) -> Result<(), Error> {
        let rt = runtime()?;
        rt.block_on(async {
            let client = BigQueryDriver::connect_client().await?;
            use gcp_bigquery_client::model::dataset::Dataset;
            client
                .dataset()
                .create(Dataset::new(&self.project_id, &self.dataset_id))
                .await
                .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;
            Ok(())
        })
    }

    fn drop_database(&self) -> Result<(), Error> {
        let rt = runtime()?;
        rt.block_on(async {
            let client = BigQueryDriver::connect_client().await?;
            let _ = client
                .dataset()
                .delete(&self.project_id, &self.dataset_id, true)
                .await;
            Ok(())
        })
    }

    fn database_exists(&self) -> Result<bool, Error> {
        let rt = runtime()?;
        rt.block_on(async {
            let client = BigQueryDriver::connect_client().await?;
            Ok(client
                .dataset()
                .get(&self.project_id, &self.dataset_id)
                .await
                .is_ok())
        })
    }

    fn open(&self) -> Result<Box<dyn Connection>, Error> {
        let rt = runtime()?;
        let client = rt.block_on(BigQueryDriver::connect_client())?;
        Ok(Box::new(BigQueryConnection {
            client,
            rt,
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
        }))
    }

    fn dump_schema(&self, applied: &[AppliedMigration]) -> Result<Vec<u8>, Error> {
        let rt = runtime()?;
        rt.block_on(async {
            let client = BigQueryDriver::connect_client().await?;
            let tables = client
                .table()
                .list(&self.project_id, &self.dataset_id, Default::default())
                .await
                .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;

            let mut dump = Vec::new();
            for table in tables.tables.unwrap_or_default() {
                let Some(reference) = table.table_reference else {
                    continue;
                };
                let ddl = format!(
                    "-- table {}.{}.{}\n",
                    reference.project_id, reference.dataset_id, reference.table_id
                );
                dump.extend_from_slice(ddl.as_bytes());
            }

            dump.extend_from_slice(b"\n-- Dbforge schema migrations\n\n");
            for migration in applied {
                dump.extend_from_slice(
                    format!(
                        "INSERT INTO schema_migrations (version, checksum) VALUES ('{}', '{}');\n",
                        migration.version,
                        migration.checksum.as_deref().unwrap_or("")
                    )
                    .as_bytes(),
                );
            }
            Ok(dump)
        })
    }
}

struct BigQueryConnection {
    client: BqClient,
    rt: Runtime,
    project_id: String,
    dataset_id: String,
}

impl BigQueryConnection {
    fn query(&mut self, sql: String) -> Result<(), Error> {
        let client = &self.client;
        let project_id = self.project_id.clone();
        self.rt
            .block_on(async {
                client
                    .job()
                    .query(&project_id, QueryRequest::new(sql))
                    .await
            })
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}

impl Connection for BigQueryConnection {
    fn migrations_table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let client = &self.client;
        let project_id = self.project_id.clone();
        let dataset_id = self.dataset_id.clone();
        let table = table.to_string();
        Ok(self
            .rt
            .block_on(async { client.table().get(&project_id, &dataset_id, &table, None).await })
            .is_ok())
    }

    /// BigQuery charges per streaming row and has no unique/primary-key constraint, so
    /// the ledger carries an explicit `checksum` column (`SPEC_FULL.md` §9) and
    /// `delete_migration` appends a tombstone row rather than deleting in place.
    fn create_migrations_table(&mut self, table: &str) -> Result<(), Error> {
        self.query(format!(
            "CREATE TABLE IF NOT EXISTS `{}.{}.{table}` (version STRING, applied_at STRING, checksum STRING, deleted BOOL)",
            self.project_id, self.dataset_id
        ))
    }

    fn select_migrations(&mut self, table: &str, limit: i64) -> Result<Vec<AppliedMigration>, Error> {
        let limit_clause = if limit < 0 {
            String::new()
        } else {
            format!(" LIMIT {limit}")
        };
        let sql = format!(
            "SELECT version, checksum FROM (
                SELECT version, checksum, applied_at, deleted,
                       ROW_NUMBER() OVER (PARTITION BY version ORDER BY applied_at DESC) AS rn
                FROM `{}.{}.{table}`
            ) WHERE rn = 1 AND NOT deleted ORDER BY version DESC{limit_clause}",
            self.project_id, self.dataset_id
        );

        let client = &self.client;
        let project_id = self.project_id.clone();
        let result = self
            .rt
            .block_on(async { client.job().query(&project_id, QueryRequest::new(sql)).await })
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;

        let mut applied = Vec::new();
        if let Some(rows) = result.query_response().rows.clone() {
            for row in rows {
                let Some(columns) = row.columns else { continue };
                let version = columns[0]
                    .value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let checksum = columns
                    .get(1)
                    .and_then(|c| c.value.as_ref())
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                applied.push(AppliedMigration { version, checksum });
            }
        }
        Ok(applied)
    }

    fn insert_migration(&mut self, table: &str, version: &str, checksum: Option<&str>) -> Result<(), Error> {
        let now = format_rfc3339(time::OffsetDateTime::now_utc());
        let mut request = TableDataInsertAllRequest::new();
        request
            .add_row(
                None,
                serde_json::json!({
                    "version": version,
                    "applied_at": now,
                    "checksum": checksum,
                    "deleted": false,
                }),
            )
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;

        let client = &self.client;
        let project_id = self.project_id.clone();
        let dataset_id = self.dataset_id.clone();
        let table = table.to_string();
        self.rt
            .block_on(async { client.tabledata().insert_all(&project_id, &dataset_id, &table, request).await })
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    fn delete_migration(&mut self, table: &str, version: &str) -> Result<(), Error> {
        let now = format_rfc3339(time::OffsetDateTime::now_utc());
        let mut request = TableDataInsertAllRequest::new();
        request
            .add_row(
                None,
                serde_json::json!({
                    "version": version,
                    "applied_at": now,
                    "checksum": serde_json::Value::Null,
                    "deleted": true,
                }),
            )
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;

        let client = &self.client;
        let project_id = self.project_id.clone();
        let dataset_id = self.dataset_id.clone();
        let table = table.to_string();
        self.rt
            .block_on(async { client.tabledata().insert_all(&project_id, &dataset_id, &table, request).await })
            .map_err(|e| Error::driver(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.query(stmt.to_string())?;
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

//! The migration engine (C6): ties the migration source, the parser, and a driver
//! together into the eight verbs `SPEC_FULL.md` describes.
//!
//! Overall shape: assert the ledger table exists, diff the filesystem against the
//! ledger, apply in order, log each step. Migrations are discovered through a
//! [`MigrationSource`] rather than compiled in, and each migration's own
//! `transaction:false` directive decides whether it runs inside a transaction.

use std::thread;
use std::time::Instant;

use time::OffsetDateTime;

use crate::checksum;
use crate::config::{EngineConfig, LogSink};
use crate::driver::{AppliedMigration, Driver};
use crate::error::Error;
use crate::fs::{MigrationSource, OsMigrationSource};
use crate::migration::Migration;

pub struct Engine {
    config: EngineConfig,
    source: Box<dyn MigrationSource>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        let source = Box::new(OsMigrationSource::new(config.migrations_dir.clone()));
        Engine { config, source }
    }

    /// Use an explicit migration source instead of the OS filesystem — for tests, or a
    /// binary that bundles its migrations with [`crate::fs::MemoryMigrationSource`].
    pub fn with_source(config: EngineConfig, source: Box<dyn MigrationSource>) -> Engine {
        Engine { config, source }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// List every migration file, sorted ascending by filename.
    pub fn discover(&self) -> Result<Vec<Migration>, Error> {
        let filenames = self.source.list_filenames()?;
        if filenames.is_empty() {
            return Err(Error::NoMigrationFiles(self.config.migrations_dir.clone()));
        }
        let mut migrations: Vec<Migration> = filenames
            .iter()
            .filter_map(|name| Migration::from_filename(name))
            .collect();
        migrations.sort();
        Ok(migrations)
    }

    /// Write a fresh, empty migration file named `<timestamp>_<name>.sql` and return
    /// its filename.
    pub fn new_migration(&self, name: &str) -> Result<String, Error> {
        if name.trim().is_empty() {
            return Err(Error::NoMigrationName);
        }
        let slug: String = name
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::parse("[year][month][day][hour][minute][second]").unwrap())
            .expect("fixed-width numeric format always succeeds");
        let filename = format!("{timestamp}_{slug}.sql");
        self.source
            .write(&filename, "-- migrate:up\n\n\n-- migrate:down\n\n")?;
        Ok(filename)
    }

    /// Poll `driver.ping()` until it succeeds or `wait_timeout` elapses.
    pub fn wait(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<(), Error> {
        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            match driver.ping() {
                Ok(()) => return Ok(()),
                Err(err) if Instant::now() < deadline => {
                    log.writeln(&format!("waiting for database: {err}"));
                    thread::sleep(self.config.wait_interval);
                }
                Err(err) => return Err(Error::CantConnect(Box::new(err))),
            }
        }
    }

    pub fn create(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<(), Error> {
        if driver.database_exists().unwrap_or(false) {
            log.writeln("database already exists");
            return Ok(());
        }
        driver.create_database()?;
        log.writeln("database created");
        Ok(())
    }

    pub fn drop(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<(), Error> {
        driver.drop_database()?;
        log.writeln("database dropped");
        Ok(())
    }

    /// Apply every migration not yet recorded in the ledger, in filename order.
    pub fn migrate(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<Vec<Migration>, Error> {
        let mut migrations = self.discover()?;
        let table = &self.config.driver.migrations_table_name;

        let mut conn = driver.open()?;
        if !conn.migrations_table_exists(table)? {
            conn.create_migrations_table(table)?;
        }

        let applied = conn.select_migrations(table, -1)?;
        let applied_versions: std::collections::HashSet<&str> =
            applied.iter().map(|m| m.version.as_str()).collect();

        let mut newly_applied = Vec::new();
        for migration in migrations.iter_mut() {
            if applied_versions.contains(migration.version()) {
                migration.set_applied(true);
                continue;
            }

            let contents = migration.read_contents(self.source.as_ref())?;
            let parsed = migration.parse(self.source.as_ref())?;
            let digest = checksum::compute(contents.as_bytes());

            log.writeln(&format!("applying {}", migration));

            let in_transaction = parsed.up_options.transaction();
            if in_transaction {
                conn.begin()?;
            }
            let result = (|| -> Result<(), Error> {
                conn.execute(&parsed.up)?;
                conn.insert_migration(table, migration.version(), Some(&digest))?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    if in_transaction {
                        conn.commit()?;
                    }
                }
                Err(err) => {
                    if in_transaction {
                        let _ = conn.rollback();
                    }
                    return Err(err);
                }
            }

            migration.set_applied(true);
            newly_applied.push(migration.clone());
        }

        if newly_applied.is_empty() {
            log.writeln("no migrations to apply");
        }

        if self.config.auto_dump_schema {
            if let Err(err) = self.dump(driver, log) {
                log.writeln(&format!("warning: schema dump failed: {err}"));
            }
        }

        Ok(newly_applied)
    }

    /// Roll back the single most recently applied migration.
    pub fn rollback(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<Migration, Error> {
        let migrations = self.discover()?;
        let table = &self.config.driver.migrations_table_name;

        let mut conn = driver.open()?;
        let last = conn
            .select_migrations(table, 1)?
            .into_iter()
            .next()
            .ok_or(Error::NoRollback)?;

        let migration = migrations
            .into_iter()
            .find(|m| m.version() == last.version)
            .ok_or_else(|| Error::MigrationNotFound(last.version.clone()))?;

        let parsed = migration.parse(self.source.as_ref())?;
        log.writeln(&format!("rolling back {}", migration));

        let in_transaction = parsed.down_options.transaction();
        if in_transaction {
            conn.begin()?;
        }
        let result = (|| -> Result<(), Error> {
            conn.execute(&parsed.down)?;
            conn.delete_migration(table, migration.version())?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                if in_transaction {
                    conn.commit()?;
                }
            }
            Err(err) => {
                if in_transaction {
                    let _ = conn.rollback();
                }
                return Err(err);
            }
        }

        if self.config.auto_dump_schema {
            if let Err(err) = self.dump(driver, log) {
                log.writeln(&format!("warning: schema dump failed: {err}"));
            }
        }

        Ok(migration)
    }

    /// Every discovered migration, annotated with whether it has been applied. The
    /// caller derives the pending count from `.filter(|m| !m.applied()).count()` —
    /// unlike dbmate's `status --exit-code`, this never caps the count at one
    /// (`SPEC_FULL.md` §11).
    pub fn status(&self, driver: &dyn Driver) -> Result<Vec<Migration>, Error> {
        let mut migrations = self.discover()?;
        let table = &self.config.driver.migrations_table_name;

        let mut conn = driver.open()?;
        let applied: std::collections::HashSet<String> = if conn.migrations_table_exists(table)? {
            conn.select_migrations(table, -1)?
                .into_iter()
                .map(|m| m.version)
                .collect()
        } else {
            Default::default()
        };

        for migration in migrations.iter_mut() {
            migration.set_applied(applied.contains(migration.version()));
        }
        Ok(migrations)
    }

    /// Write the schema dump to `schema_file`, always — callers decide whether to call
    /// it based on `auto_dump_schema`/`--no-dump-schema` (`SPEC_FULL.md` §11).
    pub fn dump(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<(), Error> {
        let table = &self.config.driver.migrations_table_name;
        let mut conn = driver.open()?;
        let applied: Vec<AppliedMigration> = if conn.migrations_table_exists(table)? {
            conn.select_migrations(table, -1)?
        } else {
            Vec::new()
        };

        let dump = driver.dump_schema(&applied)?;
        if let Some(parent) = self.config.schema_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.config.schema_file, dump).map_err(|source| Error::ReadFailed {
            path: self.config.schema_file.clone(),
            source,
        })?;
        log.writeln(&format!("wrote schema to {}", self.config.schema_file.display()));
        Ok(())
    }

    /// `up`: create the database if missing, then migrate. The convenience verb
    /// dbmate's README documents as the common case (`SPEC_FULL.md` §11).
    pub fn create_and_migrate(&self, driver: &dyn Driver, log: &mut LogSink) -> Result<Vec<Migration>, Error> {
        if !driver.database_exists().unwrap_or(false) {
            self.create(driver, log)?;
        }
        self.migrate(driver, log)
    }
}

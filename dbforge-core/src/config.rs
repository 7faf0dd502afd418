//! Configuration records passed into drivers and the engine (`SPEC_FULL.md` §3).
//!
//! Immutable records built with setter-style `self -> Self` methods, split into a flat
//! `DriverConfig`/engine-state shape.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::checksum::ChecksumMode;

/// Immutable record passed when constructing a driver.
#[derive(Clone)]
pub struct DriverConfig {
    pub database_url: String,
    pub migrations_table_name: String,
    pub checksum_mode: ChecksumMode,
}

impl DriverConfig {
    pub fn new(database_url: impl Into<String>) -> DriverConfig {
        DriverConfig {
            database_url: database_url.into(),
            migrations_table_name: "schema_migrations".to_string(),
            checksum_mode: ChecksumMode::None,
        }
    }

    pub fn with_migrations_table_name(mut self, name: impl Into<String>) -> DriverConfig {
        self.migrations_table_name = name.into();
        self
    }

    pub fn with_checksum_mode(mut self, mode: ChecksumMode) -> DriverConfig {
        self.checksum_mode = mode;
        self
    }
}

/// Top-level engine configuration: where migrations live, where the schema dump goes,
/// and the behavioral flags from `SPEC_FULL.md` §3/§11.
pub struct EngineConfig {
    pub driver: DriverConfig,
    pub migrations_dir: PathBuf,
    pub schema_file: PathBuf,
    pub auto_dump_schema: bool,
    pub verbose: bool,
    pub wait_before: bool,
    pub wait_interval: Duration,
    pub wait_timeout: Duration,
}

impl EngineConfig {
    pub fn new(database_url: impl Into<String>) -> EngineConfig {
        EngineConfig {
            driver: DriverConfig::new(database_url),
            migrations_dir: PathBuf::from("./db/migrations"),
            schema_file: PathBuf::from("./db/schema.sql"),
            auto_dump_schema: true,
            verbose: false,
            wait_before: false,
            wait_interval: Duration::from_millis(1000),
            wait_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> EngineConfig {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_schema_file(mut self, file: impl Into<PathBuf>) -> EngineConfig {
        self.schema_file = file.into();
        self
    }

    pub fn with_migrations_table_name(mut self, name: impl Into<String>) -> EngineConfig {
        self.driver = self.driver.with_migrations_table_name(name);
        self
    }

    pub fn with_auto_dump_schema(mut self, enabled: bool) -> EngineConfig {
        self.auto_dump_schema = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> EngineConfig {
        self.verbose = verbose;
        self
    }

    pub fn with_wait_before(mut self, wait_before: bool) -> EngineConfig {
        self.wait_before = wait_before;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> EngineConfig {
        self.wait_timeout = timeout;
        self
    }
}

/// Write-only text sink drivers log progress to (`DriverConfig::log_sink` in the
/// spec). A thin wrapper around anything `Write`, defaulting to stdout in the CLI.
pub struct LogSink {
    inner: Box<dyn Write + Send>,
}

impl LogSink {
    pub fn new(inner: impl Write + Send + 'static) -> LogSink {
        LogSink {
            inner: Box::new(inner),
        }
    }

    pub fn stdout() -> LogSink {
        LogSink::new(std::io::stdout())
    }

    pub fn writeln(&mut self, msg: &str) {
        let _ = writeln!(self.inner, "{msg}");
    }
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink::stdout()
    }
}

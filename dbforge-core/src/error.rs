use std::path::PathBuf;
use thiserror::Error as TError;

/// A single error type covering every way a migration operation can fail.
///
/// One `#[error(...)]` variant per distinct failure. There is no `Report` to carry
/// here: the engine applies/rolls back one migration at a time, and the caller already
/// knows which one failed from the log.
#[derive(Debug, TError)]
pub enum Error {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("unsupported driver scheme: {0}")]
    UnsupportedDriver(String),

    #[error("migration name must not be empty")]
    NoMigrationName,

    #[error("unknown checksum mode: {0}")]
    UnknownChecksumMode(String),

    #[error("migrations directory not found: {0}")]
    MigrationDirNotFound(PathBuf),

    #[error("could not read migration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration file already exists: {0}")]
    MigrationAlreadyExists(PathBuf),

    #[error("{filename}: missing \"-- migrate:up\" directive")]
    ParseMissingUp { filename: String },

    #[error("{filename}: missing \"-- migrate:down\" directive")]
    ParseMissingDown { filename: String },

    #[error("{filename}: \"-- migrate:down\" appears before \"-- migrate:up\"")]
    ParseWrongOrder { filename: String },

    #[error("{filename}: unexpected statement before \"-- migrate:up\": {line:?}")]
    ParseUnexpectedStmt { filename: String, line: String },

    #[error("no migration files found in {0}")]
    NoMigrationFiles(PathBuf),

    #[error("migration not found: {0}")]
    MigrationNotFound(String),

    #[error("can't rollback: no migrations have been applied")]
    NoRollback,

    #[error("could not connect to database after waiting: {0}")]
    CantConnect(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap an arbitrary driver error into [`Error::Driver`].
    ///
    /// Named `driver` rather than `from` because a blanket `From` impl would make it
    /// impossible to tell, at the call site, that an opaque boxed error is being
    /// created instead of a specific variant.
    pub fn driver<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Driver(Box::new(err))
    }
}

/// Extension trait adapting a `Result<T, E>` from driver code into `Result<T, Error>`.
pub trait WrapContext<T> {
    fn driver_err(self) -> Result<T, Error>;
}

impl<T, E> WrapContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn driver_err(self) -> Result<T, Error> {
        self.map_err(Error::driver)
    }
}

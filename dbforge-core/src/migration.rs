//! The on-disk migration file model (C1).
//!
//! `Ord`/`PartialEq` by version, `Display` for logging, and a `^(\d+).*\.sql$`
//! single-file convention with up/down directives discovered at runtime rather than
//! embedded at compile time.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;
use crate::fs::MigrationSource;
use crate::parser::{self, ParsedMigration};

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+).*\.sql$").unwrap())
}

/// Extract `(version, filename)` from a basename, or `None` if it doesn't match the
/// `^(\d+).*\.sql$` convention.
pub fn parse_filename(filename: &str) -> Option<String> {
    filename_re()
        .captures(filename)
        .map(|caps| caps[1].to_string())
}

/// One on-disk migration, as discovered by [`crate::engine::Engine::discover`].
///
/// `applied` is populated by cross-referencing the driver's `select_migrations`
/// result; it is not known at construction time.
#[derive(Debug, Clone)]
pub struct Migration {
    version: String,
    filename: String,
    applied: bool,
}

impl Migration {
    /// Build a `Migration` from a basename, failing if it doesn't match the naming
    /// convention required by `SPEC_FULL.md` §3.
    pub fn from_filename(filename: &str) -> Option<Migration> {
        let version = parse_filename(filename)?;
        Some(Migration {
            version,
            filename: filename.to_string(),
            applied: false,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn set_applied(&mut self, applied: bool) {
        self.applied = applied;
    }

    /// Read the migration's contents through the given filesystem capability.
    pub fn read_contents(&self, source: &dyn MigrationSource) -> Result<String, Error> {
        source.read_to_string(&self.filename)
    }

    /// Parse the migration's contents into up/down blocks.
    pub fn parse(&self, source: &dyn MigrationSource) -> Result<ParsedMigration, Error> {
        let contents = self.read_contents(source)?;
        parser::parse(&self.filename, &contents)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename)
    }
}

impl PartialEq for Migration {
    fn eq(&self, other: &Migration) -> bool {
        self.filename == other.filename
    }
}

impl Eq for Migration {}

impl PartialOrd for Migration {
    fn partial_cmp(&self, other: &Migration) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Migration {
    /// Migrations sort by filename ascending, reproducing chronological order for the
    /// `YYYYMMDDHHMMSS_*` convention. Deliberately *not* a parsed-timestamp
    /// comparison — see `SPEC_FULL.md` §9's note on mixed filename layouts.
    fn cmp(&self, other: &Migration) -> Ordering {
        self.filename.cmp(&other.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_leading_digit_run() {
        let m = Migration::from_filename("20200101000000_create_users.sql").unwrap();
        assert_eq!(m.version(), "20200101000000");
    }

    #[test]
    fn rejects_non_matching_filenames() {
        assert!(Migration::from_filename("create_users.sql").is_none());
        assert!(Migration::from_filename("20200101000000_create_users.txt").is_none());
    }

    #[test]
    fn orders_by_filename() {
        let mut a = Migration::from_filename("20200101000000_a.sql").unwrap();
        let b = Migration::from_filename("20200102000000_b.sql").unwrap();
        assert!(a < b);
        a.set_applied(true);
        assert!(a.applied());
    }
}

//! Filesystem indirection for migration discovery (`SPEC_FULL.md` §9).
//!
//! Walks a directory, filtering by filename pattern, behind a small object-safe trait
//! so an in-memory snapshot can stand in for the OS filesystem during tests or for a
//! binary that bundles its migrations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;
use crate::migration::parse_filename;

/// "Given a directory, list migration filenames; given a filename, return its bytes."
pub trait MigrationSource: Send + Sync {
    fn list_filenames(&self) -> Result<Vec<String>, Error>;
    fn read_to_string(&self, filename: &str) -> Result<String, Error>;
    fn write(&self, filename: &str, contents: &str) -> Result<(), Error>;
}

/// The default, OS-backed filesystem provider, rooted at a single migrations
/// directory.
pub struct OsMigrationSource {
    dir: PathBuf,
}

impl OsMigrationSource {
    pub fn new(dir: impl Into<PathBuf>) -> OsMigrationSource {
        OsMigrationSource { dir: dir.into() }
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl MigrationSource for OsMigrationSource {
    fn list_filenames(&self) -> Result<Vec<String>, Error> {
        if !self.dir.is_dir() {
            return Err(Error::MigrationDirNotFound(self.dir.clone()));
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if parse_filename(name).is_some() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn read_to_string(&self, filename: &str) -> Result<String, Error> {
        std::fs::read_to_string(self.path_for(filename)).map_err(|source| Error::ReadFailed {
            path: self.path_for(filename),
            source,
        })
    }

    fn write(&self, filename: &str, contents: &str) -> Result<(), Error> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::CreateDirectory {
                path: self.dir.clone(),
                source,
            })?;
            set_dir_permissions(&self.dir);
        }

        let path = self.path_for(filename);
        if path.exists() {
            return Err(Error::MigrationAlreadyExists(path));
        }

        std::fs::write(&path, contents).map_err(|source| Error::ReadFailed { path, source })?;
        set_file_permissions(&self.path_for(filename));
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755));
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) {}

#[cfg(unix)]
fn set_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644));
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) {}

/// An in-memory migration source, useful for embedding migrations into a binary or
/// for tests that would rather not touch the real filesystem.
#[derive(Default)]
pub struct MemoryMigrationSource {
    files: BTreeMap<String, String>,
}

impl MemoryMigrationSource {
    pub fn new() -> MemoryMigrationSource {
        MemoryMigrationSource::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(filename.into(), contents.into());
    }
}

impl MigrationSource for MemoryMigrationSource {
    fn list_filenames(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .files
            .keys()
            .filter(|name| parse_filename(name).is_some())
            .cloned()
            .collect())
    }

    fn read_to_string(&self, filename: &str) -> Result<String, Error> {
        self.files.get(filename).cloned().ok_or_else(|| Error::ReadFailed {
            path: PathBuf::from(filename),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found in memory source"),
        })
    }

    fn write(&self, filename: &str, _contents: &str) -> Result<(), Error> {
        Err(Error::CreateDirectory {
            path: PathBuf::from(filename),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "memory migration source is read-only",
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn os_source_lists_only_matching_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20200101000000_a.sql"), "a").unwrap();
        std::fs::write(dir.path().join("not_a_migration.sql"), "b").unwrap();
        std::fs::write(dir.path().join("readme.md"), "c").unwrap();

        let source = OsMigrationSource::new(dir.path());
        let mut names = source.list_filenames().unwrap();
        names.sort();
        assert_eq!(names, vec!["20200101000000_a.sql".to_string()]);
    }

    #[test]
    fn os_source_missing_dir_errors() {
        let source = OsMigrationSource::new("/no/such/dir/hopefully");
        assert!(matches!(
            source.list_filenames(),
            Err(Error::MigrationDirNotFound(_))
        ));
    }

    #[test]
    fn memory_source_round_trips() {
        let mut source = MemoryMigrationSource::new();
        source.insert("20200101000000_a.sql", "-- migrate:up\n-- migrate:down\n");
        assert_eq!(source.list_filenames().unwrap().len(), 1);
        assert!(source.read_to_string("20200101000000_a.sql").is_ok());
    }
}

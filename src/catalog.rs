//! # Migration Catalog
//!
//! Discovers and orders the fixed set of schema-change files available to
//! apply to tenant databases. The catalog is a deployment artifact: it is
//! resolved once at startup, immutable for the process lifetime, and injected
//! into the provisioner and upgrade engine rather than re-read per call.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppConfig;

/// Filename pattern for catalog entries: a 14-digit version prefix, an
/// underscore, a description, and a `.sql` suffix. Anything else in the
/// directory is a non-migration asset and is silently skipped.
static MIGRATION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{14})_.+\.sql$").expect("migration filename pattern is valid")
});

/// Fallback catalog locations probed when no directory is configured.
/// First match wins.
const FALLBACK_DIRS: &[&str] = &["migrations", "db/migrations", "sql/migrations"];

/// One schema-change file in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    /// Fixed-width version token parsed from the filename prefix.
    /// Lexicographic comparison is valid because all versions share the
    /// same width.
    pub version: String,
    /// Bare filename, used in error reporting
    pub filename: String,
    /// Absolute or working-directory-relative path to the file
    pub path: PathBuf,
}

impl MigrationFile {
    /// Read the SQL body of this migration.
    pub async fn read_sql(&self) -> std::io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}

/// Ordered, immutable snapshot of the deployed migration catalog.
#[derive(Debug, Clone, Default)]
pub struct MigrationCatalog {
    files: Vec<MigrationFile>,
}

impl MigrationCatalog {
    /// Resolve the catalog directory from configuration (or the fallback
    /// locations) and load a snapshot. An unreachable or empty location
    /// yields an empty catalog with a warning, never an error: callers treat
    /// "zero pending migrations" as a soft condition so tenant creation
    /// degrades instead of blocking.
    pub fn load(config: &AppConfig) -> Self {
        let dir = config
            .migrations_dir
            .clone()
            .or_else(|| {
                FALLBACK_DIRS
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| candidate.is_dir())
            });

        match dir {
            Some(dir) => Self::from_dir(&dir),
            None => {
                warn!("No migration catalog directory found; catalog is empty");
                Self::default()
            }
        }
    }

    /// Load a snapshot from one directory.
    pub fn from_dir(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    error = %err,
                    "Migration catalog directory unreachable; catalog is empty"
                );
                return Self::default();
            }
        };

        let mut files: Vec<MigrationFile> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let filename = entry.file_name().to_str()?.to_string();
                let captures = MIGRATION_FILENAME.captures(&filename)?;
                let version = captures.get(1)?.as_str().to_string();
                Some(MigrationFile {
                    version,
                    filename,
                    path: entry.path(),
                })
            })
            .collect();

        files.sort_by(|a, b| a.version.cmp(&b.version));

        if files.is_empty() {
            warn!(dir = %dir.display(), "Migration catalog is empty");
        } else {
            debug!(
                dir = %dir.display(),
                count = files.len(),
                latest = files.last().map(|f| f.version.as_str()),
                "Loaded migration catalog"
            );
        }

        Self { files }
    }

    /// Build a catalog directly from files (used by tests).
    pub fn from_files(mut files: Vec<MigrationFile>) -> Self {
        files.sort_by(|a, b| a.version.cmp(&b.version));
        Self { files }
    }

    /// All catalog entries, ascending by version.
    pub fn migrations(&self) -> &[MigrationFile] {
        &self.files
    }

    /// Entries with a version strictly greater than `version`, or the whole
    /// catalog when `version` is `None` (the never-provisioned case).
    pub fn migrations_since(&self, version: Option<&str>) -> &[MigrationFile] {
        match version {
            None => &self.files,
            Some(version) => {
                let start = self
                    .files
                    .partition_point(|file| file.version.as_str() <= version);
                &self.files[start..]
            }
        }
    }

    /// Version of the newest catalog entry, or `None` if the catalog is empty.
    pub fn latest_version(&self) -> Option<&str> {
        self.files.last().map(|file| file.version.as_str())
    }

    /// Number of entries in the catalog.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the catalog holds no entries.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

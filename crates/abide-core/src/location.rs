use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::{codec::SNAPSHOT_EXTENSION, error::SnapshotError};

pub const DEFAULT_SNAPSHOTS_DIR: &str = "__snapshots__";

/// Where snapshot files live for one test run, and which file new
/// snapshots of the running package are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLocation {
    root: PathBuf,
    dir_name: String,
    package: String,
}

impl SnapshotLocation {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            dir_name: DEFAULT_SNAPSHOTS_DIR.to_string(),
            package: package.into(),
        }
    }

    /// Resolves the location from the working directory of the test
    /// process; the package name is the directory's base name.
    pub fn from_current_dir() -> Result<Self, SnapshotError> {
        let cwd = env::current_dir().map_err(|_| SnapshotError::UnableToLocateTestPath)?;
        let package = cwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(SnapshotError::UnableToLocateTestPath)?;
        Ok(Self::new(cwd, package))
    }

    #[must_use]
    pub fn with_dir_name(mut self, dir_name: impl Into<String>) -> Self {
        self.dir_name = dir_name.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.dir_name)
    }

    #[must_use]
    pub fn package_file(&self) -> PathBuf {
        self.directory()
            .join(format!("{}.{SNAPSHOT_EXTENSION}", self.package))
    }

    #[instrument(skip(self), fields(root = %self.root.display(), dir = %self.dir_name))]
    pub fn find_or_create(&self) -> Result<PathBuf, SnapshotError> {
        let dir = self.directory();
        if dir.is_dir() {
            return Ok(dir);
        }

        fs::create_dir_all(&dir)
            .map_err(|_| SnapshotError::UnableToCreateSnapshotDirectory(dir.clone()))?;
        info!(path = %dir.display(), "snapshot directory created");
        Ok(dir)
    }

    /// Lists the snapshot files directly inside the snapshot directory,
    /// sorted by path.
    pub fn snapshot_files(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        let dir = self.find_or_create()?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(?error, "ignoring unreadable entry in snapshot directory");
                    continue;
                }
            };

            if entry.file_type().is_file() && is_snapshot_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!(count = files.len(), "snapshot files discovered");
        Ok(files)
    }
}

#[must_use]
pub fn is_snapshot_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(SNAPSHOT_EXTENSION))
}

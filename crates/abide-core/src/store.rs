use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use anyhow::Context;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    codec,
    error::SnapshotError,
    location::SnapshotLocation,
    record::{SnapshotId, SnapshotRecord},
};

pub type SkipHook = Arc<dyn Fn(&LoadOutcome) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Loaded(usize),
    Skipped(String),
}

/// Result of reading one snapshot file during [`SnapshotStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl LoadOutcome {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, FileStatus::Skipped(_))
    }
}

/// Every snapshot record of one test run.
///
/// The directory is scanned once, on first use. All mutations and every
/// persist run under the same registry lock; a persist rewrites each
/// owning file completely from the in-memory records. Files skipped during
/// the load are never rewritten.
pub struct SnapshotStore {
    location: SnapshotLocation,
    loaded: OnceCell<Vec<LoadOutcome>>,
    registry: Mutex<BTreeMap<SnapshotId, SnapshotRecord>>,
    skip_hook: Option<SkipHook>,
}

impl fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("location", &self.location)
            .field("loaded", &self.loaded.get().is_some())
            .field("records", &self.registry.lock().len())
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    #[must_use]
    pub fn new(location: SnapshotLocation) -> Self {
        Self {
            location,
            loaded: OnceCell::new(),
            registry: Mutex::new(BTreeMap::new()),
            skip_hook: None,
        }
    }

    /// Registers a callback invoked for every file skipped during load.
    #[must_use]
    pub fn with_skip_hook(mut self, hook: impl Fn(&LoadOutcome) + Send + Sync + 'static) -> Self {
        self.skip_hook = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn location(&self) -> &SnapshotLocation {
        &self.location
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Loads every snapshot file exactly once. Concurrent first callers
    /// block until the single scan finishes.
    pub fn load(&self) -> Result<&[LoadOutcome], SnapshotError> {
        self.loaded
            .get_or_try_init(|| self.load_files())
            .map(Vec::as_slice)
    }

    pub fn get(&self, id: &SnapshotId) -> Result<Option<SnapshotRecord>, SnapshotError> {
        self.load()?;
        Ok(self.registry.lock().get(id).cloned())
    }

    /// Marks the record evaluated, withdrawing any pending removal, and
    /// returns its stored value.
    pub fn evaluate(&self, id: &SnapshotId) -> Result<Option<String>, SnapshotError> {
        self.load()?;
        let mut registry = self.registry.lock();
        Ok(registry.get_mut(id).map(|record| {
            record.evaluated = true;
            record.should_remove = false;
            record.value.clone()
        }))
    }

    pub fn create(&self, id: SnapshotId, value: &str) -> Result<SnapshotRecord, SnapshotError> {
        self.write(id, value, false)
    }

    pub fn update(&self, id: SnapshotId, value: &str) -> Result<SnapshotRecord, SnapshotError> {
        self.write(id, value, true)
    }

    pub fn records(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        self.load()?;
        Ok(self.registry.lock().values().cloned().collect())
    }

    /// Identifiers of records not evaluated so far in this run.
    pub fn unevaluated(&self) -> Result<Vec<SnapshotId>, SnapshotError> {
        self.load()?;
        Ok(self
            .registry
            .lock()
            .values()
            .filter(|record| record.is_stale())
            .map(|record| record.id.clone())
            .collect())
    }

    /// Flags every unevaluated record for removal and returns their ids.
    /// Nothing is persisted until [`SnapshotStore::save`].
    pub fn mark_unevaluated_for_removal(&self) -> Result<Vec<SnapshotId>, SnapshotError> {
        self.load()?;
        let mut registry = self.registry.lock();
        let mut marked = Vec::new();
        for record in registry.values_mut() {
            if record.is_stale() && !record.should_remove {
                record.should_remove = true;
                marked.push(record.id.clone());
            }
        }
        Ok(marked)
    }

    pub fn save(&self) -> Result<(), SnapshotError> {
        let registry = self.registry.lock();
        persist(&registry, &self.skipped_paths())
    }

    fn skipped_paths(&self) -> BTreeSet<&Path> {
        self.loaded
            .get()
            .map(|outcomes| {
                outcomes
                    .iter()
                    .filter(|outcome| outcome.is_skipped())
                    .map(|outcome| outcome.path.as_path())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[instrument(skip(self, value), fields(id = %id))]
    fn write(
        &self,
        id: SnapshotId,
        value: &str,
        is_update: bool,
    ) -> Result<SnapshotRecord, SnapshotError> {
        let value = value.trim();
        if !codec::is_encodable_value(value) {
            return Err(SnapshotError::UnencodableSnapshotValue(id.to_string()));
        }

        self.load()?;
        self.location.find_or_create()?;
        let skipped = self.skipped_paths();
        let package_file = self.location.package_file();

        let mut registry = self.registry.lock();
        let path = if is_update {
            registry
                .get(&id)
                .and_then(|record| record.path.clone())
                .unwrap_or(package_file)
        } else {
            package_file
        };
        if skipped.contains(path.as_path()) {
            return Err(SnapshotError::UnreadableSnapshotFile(path));
        }

        let mut record = SnapshotRecord::new(id.clone(), value, Some(path));
        record.evaluated = true;
        registry.insert(id, record.clone());
        persist(&registry, &skipped)?;

        debug!(path = ?record.path, "snapshot written");
        Ok(record)
    }

    #[instrument(skip(self), fields(dir = %self.location.directory().display()))]
    fn load_files(&self) -> Result<Vec<LoadOutcome>, SnapshotError> {
        let paths = self.location.snapshot_files()?;

        let decoded: Vec<(PathBuf, Result<Vec<(SnapshotId, String)>, String>)> =
            thread::scope(|scope| {
                let handles: Vec<_> = paths
                    .iter()
                    .map(|path| (path, scope.spawn(move || read_snapshot_file(path))))
                    .collect();

                handles
                    .into_iter()
                    .map(|(path, handle)| {
                        let result = match handle.join() {
                            Ok(result) => result.map_err(|error| format!("{error:#}")),
                            Err(_) => Err("snapshot decoder thread panicked".to_string()),
                        };
                        (path.clone(), result)
                    })
                    .collect()
            });

        let mut merged: BTreeMap<SnapshotId, SnapshotRecord> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(decoded.len());
        for (path, result) in decoded {
            let status = match result {
                Ok(entries) => {
                    let count = entries.len();
                    for (id, value) in entries {
                        if let Some(existing) = merged.get(&id) {
                            if existing.path.as_deref() != Some(path.as_path()) {
                                return Err(SnapshotError::DuplicateSnapshot {
                                    id: id.to_string(),
                                    first: existing.path.clone().unwrap_or_default(),
                                    second: path,
                                });
                            }
                        }
                        merged.insert(
                            id.clone(),
                            SnapshotRecord::new(id, value, Some(path.clone())),
                        );
                    }
                    FileStatus::Loaded(count)
                }
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "skipping unreadable snapshot file");
                    FileStatus::Skipped(reason)
                }
            };

            let outcome = LoadOutcome { path, status };
            if outcome.is_skipped() {
                if let Some(hook) = &self.skip_hook {
                    hook(&outcome);
                }
            }
            outcomes.push(outcome);
        }

        let count = merged.len();
        self.registry.lock().extend(merged);
        info!(files = outcomes.len(), snapshots = count, "snapshots loaded");
        Ok(outcomes)
    }
}

fn read_snapshot_file(path: &Path) -> anyhow::Result<Vec<(SnapshotId, String)>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot file: {}", path.display()))?;
    let entries = codec::decode(&content)
        .with_context(|| format!("failed to decode snapshot file: {}", path.display()))?;
    Ok(entries)
}

fn persist(
    registry: &BTreeMap<SnapshotId, SnapshotRecord>,
    skipped: &BTreeSet<&Path>,
) -> Result<(), SnapshotError> {
    let mut by_path: BTreeMap<&Path, Vec<&SnapshotRecord>> = BTreeMap::new();
    for record in registry.values() {
        let Some(path) = record.path.as_deref() else {
            continue;
        };
        if skipped.contains(path) {
            return Err(SnapshotError::UnreadableSnapshotFile(path.to_path_buf()));
        }
        let records = by_path.entry(path).or_default();
        if !record.should_remove {
            records.push(record);
        }
    }

    for (path, records) in by_path {
        let content = codec::encode(
            records
                .into_iter()
                .map(|record| (&record.id, record.value.as_str())),
        );
        write_snapshot_file(path, &content)?;
    }
    Ok(())
}

fn write_snapshot_file(path: &Path, content: &str) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(&parent)
        .context("failed to create temp snapshot file")?;
    temp_file
        .write_all(content.as_bytes())
        .context("failed to write temp snapshot file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist snapshot file: {}", path.display()))?;
    Ok(())
}

use std::{fmt, path::PathBuf};

use crate::error::SnapshotError;

/// Opening and terminator of the delimiter line that starts every snapshot
/// block.
pub(crate) const DELIMITER_START: &str = "/* snapshot: ";
pub(crate) const DELIMITER_END: &str = " */";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Validates `raw` as an identifier that can be written into a
    /// delimiter line and read back unchanged.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SnapshotError> {
        let raw = raw.into();
        if is_valid_id(&raw) {
            Ok(Self(raw))
        } else {
            Err(SnapshotError::InvalidSnapshotId(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// No `/*` anywhere: an id holding the opening delimiter, or ending so that
// it forms one with the terminator, would split its own block on decode.
fn is_valid_id(raw: &str) -> bool {
    !raw.trim().is_empty()
        && !raw.contains(['\n', '\r'])
        && !raw.contains("/*")
        && !raw.contains(DELIMITER_END)
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SnapshotId {
    type Error = SnapshotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for SnapshotId {
    type Error = SnapshotError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SnapshotId> for String {
    fn from(value: SnapshotId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub value: String,
    /// File the record is persisted to; `None` records are never written.
    pub path: Option<PathBuf>,
    pub evaluated: bool,
    pub should_remove: bool,
}

impl SnapshotRecord {
    #[must_use]
    pub fn new(id: SnapshotId, value: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            id,
            value: value.into(),
            path,
            evaluated: false,
            should_remove: false,
        }
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        !self.evaluated
    }
}

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unable to locate test path")]
    UnableToLocateTestPath,
    #[error("unable to create snapshot directory: {}", .0.display())]
    UnableToCreateSnapshotDirectory(PathBuf),
    #[error("invalid snapshot id: {0:?}")]
    InvalidSnapshotId(String),
    #[error(
        "snapshot `{id}` is defined in both {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateSnapshot {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("snapshot `{0}` holds the snapshot delimiter and cannot be stored")]
    UnencodableSnapshotValue(String),
    #[error("refusing to overwrite unreadable snapshot file {}", .0.display())]
    UnreadableSnapshotFile(PathBuf),
    #[error("malformed JSON body: {0}")]
    MalformedJsonBody(String),
    #[error("{0} unused snapshots")]
    UnusedSnapshots(usize),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for SnapshotError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

/// Reasons a snapshot file's content could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed snapshot delimiter line: {0:?}")]
    MalformedDelimiter(String),
    #[error("invalid snapshot id in delimiter: {0:?}")]
    InvalidId(String),
}

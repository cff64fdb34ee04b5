//! Text encoding of a snapshot file.
//!
//! A file is a sequence of blocks, each opened by a delimiter line
//! `/* snapshot: <id> */` and followed by the stored value. Blocks are
//! separated by one blank line and sorted by identifier.

use std::fmt::Write as _;

use crate::{
    error::DecodeError,
    record::{DELIMITER_END, DELIMITER_START, SnapshotId},
};

pub const SNAPSHOT_EXTENSION: &str = "snapshot";

/// False when `value` holds the opening delimiter, which would make the
/// rest of the value decode as a separate block.
#[must_use]
pub fn is_encodable_value(value: &str) -> bool {
    !value.contains(DELIMITER_START)
}

#[must_use]
pub fn encode<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a SnapshotId, &'a str)>,
{
    let mut entries: Vec<_> = entries.into_iter().collect();
    entries.sort_by(|left, right| left.0.cmp(right.0));

    let mut out = String::new();
    for (id, value) in entries {
        // Writing into a String cannot fail.
        let _ = write!(out, "{DELIMITER_START}{id}{DELIMITER_END}\n{value}\n\n");
    }
    out.trim().to_string()
}

pub fn decode(content: &str) -> Result<Vec<(SnapshotId, String)>, DecodeError> {
    let mut records = Vec::new();
    for segment in content.split(DELIMITER_START) {
        if segment.trim().is_empty() {
            continue;
        }

        let (header, value) = segment.split_once('\n').unwrap_or((segment, ""));
        let header = header.trim_end_matches('\r');
        let raw_id = header
            .strip_suffix(DELIMITER_END)
            .ok_or_else(|| DecodeError::MalformedDelimiter(header.to_string()))?;
        let id = SnapshotId::parse(raw_id).map_err(|_| DecodeError::InvalidId(raw_id.to_string()))?;

        records.push((id, value.trim().to_string()));
    }
    Ok(records)
}

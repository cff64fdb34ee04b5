//! End-of-suite reconciliation of snapshots nobody evaluated.

use tracing::{instrument, warn};

use crate::{assertion::Abide, error::SnapshotError};

impl Abide {
    /// In update mode (and outside a single run) drops every snapshot not
    /// evaluated this run, then persists the store.
    #[instrument(skip(self), fields(update = self.mode().update, single_run = self.mode().single_run))]
    pub fn cleanup(&self) -> Result<(), SnapshotError> {
        let mode = self.mode();
        if mode.update && !mode.single_run {
            for id in self.store().mark_unevaluated_for_removal()? {
                println!("Removing unused snapshot `{id}`");
            }
        } else {
            self.store().load()?;
        }

        self.store().save()
    }

    /// Like [`Abide::cleanup`] in update mode; otherwise fails when any
    /// snapshot went unevaluated. A single run never fails.
    #[instrument(skip(self), fields(update = self.mode().update, single_run = self.mode().single_run))]
    pub fn cleanup_or_fail(&self) -> Result<(), SnapshotError> {
        let mode = self.mode();
        if mode.single_run {
            return Ok(());
        }
        if mode.update {
            return self.cleanup();
        }

        let unused = self.store().unevaluated()?;
        for id in &unused {
            eprintln!("Unused snapshot `{id}`");
        }

        if unused.is_empty() {
            Ok(())
        } else {
            warn!(count = unused.len(), "unused snapshots found");
            Err(SnapshotError::UnusedSnapshots(unused.len()))
        }
    }
}

pub fn cleanup() -> Result<(), SnapshotError> {
    Abide::global()?.cleanup()
}

pub fn cleanup_or_fail() -> Result<(), SnapshotError> {
    Abide::global()?.cleanup_or_fail()
}

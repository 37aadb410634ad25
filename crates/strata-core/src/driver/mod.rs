//! Snapshot storage drivers.
//!
//! A driver realizes snapshot IDs as on-disk storage and turns active
//! records into mount specifications. Every mutating step has a matching
//! compensating step so the snapshotter can undo filesystem work when the
//! metadata transaction that should accompany it fails to commit.

pub mod btrfs;
pub mod layout;
pub mod naive;
pub mod overlay;

use std::fmt;
use std::path::Path;

use strata_common::error::Result;
use strata_common::types::{ActiveSnapshot, Kind, MountSpec, SnapshotId};

use crate::fsutil;
pub use layout::{AreaScan, Layout, MarkedRemoval};

/// Storage backend for snapshots.
///
/// Implementations are chosen once when the snapshotter is constructed.
pub trait SnapshotDriver: Send + Sync + fmt::Debug {
    /// Registry name of this driver.
    fn name(&self) -> &'static str;

    /// Paths of the driver root.
    fn layout(&self) -> &Layout;

    /// Allocates storage for a new active snapshot.
    ///
    /// On failure nothing created by this call remains on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be created.
    fn create_active_storage(&self, active: &ActiveSnapshot) -> Result<()>;

    /// Deletes storage created by [`Self::create_active_storage`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be deleted.
    fn destroy_active_storage(&self, id: &SnapshotId) -> Result<()> {
        fsutil::remove_path(&self.layout().active_path(id))
    }

    /// Folds active storage into its immutable committed location.
    ///
    /// # Errors
    ///
    /// Returns an error if the promotion fails. The active storage is then
    /// left as it was.
    fn promote_to_committed(&self, id: &SnapshotId) -> Result<()> {
        self.layout().promote(id)
    }

    /// Undoes [`Self::promote_to_committed`] after a failed metadata commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed artifact cannot be undone.
    fn revert_promotion(&self, id: &SnapshotId) -> Result<()> {
        self.layout().demote(id)
    }

    /// Cleans up after a promotion whose metadata commit succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if leftover active storage cannot be deleted.
    fn finish_promotion(&self, _id: &SnapshotId) -> Result<()> {
        Ok(())
    }

    /// First removal phase: renames the storage to its `rm-<id>` path.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn mark_for_removal(&self, id: &SnapshotId, kind: Kind) -> Result<Option<MarkedRemoval>> {
        self.layout().mark_for_removal(id, kind)
    }

    /// Renames a marked unit back after a failed metadata commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn restore_marked(&self, marked: &MarkedRemoval) -> Result<()> {
        self.layout().restore(marked)
    }

    /// Second removal phase: deletes the marked unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit cannot be deleted.
    fn purge_marked(&self, marked: &MarkedRemoval) -> Result<()> {
        self.discard(&marked.marked)
    }

    /// Deletes an arbitrary storage unit found in one of the areas.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit cannot be deleted.
    fn discard(&self, path: &Path) -> Result<()> {
        fsutil::remove_path(path)
    }

    /// Builds the ordered mount specifications for an active snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver must probe storage and the probe fails.
    fn build_mounts(&self, active: &ActiveSnapshot) -> Result<Vec<MountSpec>>;
}

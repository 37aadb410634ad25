//! btrfs subvolume driver.
//!
//! Active snapshots are writable subvolumes (or readonly snapshots for
//! views) under `active/`. Committing takes a readonly snapshot into
//! `snapshots/`; the active subvolume is deleted only once the metadata
//! commit has succeeded, so a failed commit can drop the new snapshot and
//! leave the original untouched.

use std::path::{Path, PathBuf};

use strata_common::error::{Result, SnapshotError};
use strata_common::types::{ActiveSnapshot, MountSpec, SnapshotId};

use super::{Layout, MarkedRemoval, SnapshotDriver};
use crate::probe;
use crate::volume::{BtrfsCommand, VolumeOps};

/// Driver backed by copy-on-write subvolumes.
#[derive(Debug)]
pub struct BtrfsDriver {
    layout: Layout,
    device: String,
    volumes: Box<dyn VolumeOps>,
}

impl BtrfsDriver {
    /// Registry name.
    pub const NAME: &'static str = "btrfs";

    /// Opens the driver on a btrfs filesystem using the `btrfs` tool.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Config` if no device is configured, the root
    /// is not on btrfs, or the `btrfs` tool is missing.
    pub fn open(root: impl Into<PathBuf>, device: Option<&str>) -> Result<Self> {
        let Some(device) = device.filter(|d| !d.is_empty()) else {
            return Err(SnapshotError::Config {
                message: "btrfs driver requires a device".into(),
            });
        };
        let layout = Layout::create(root)?;
        if !probe::is_btrfs(layout.root())? {
            return Err(SnapshotError::Config {
                message: format!("{} is not on a btrfs filesystem", layout.root().display()),
            });
        }
        let volumes = BtrfsCommand::locate()?;
        tracing::info!(root = %layout.root().display(), device, "btrfs driver ready");
        Ok(Self {
            layout,
            device: device.to_owned(),
            volumes: Box::new(volumes),
        })
    }

    /// Builds the driver over arbitrary volume operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage areas cannot be created.
    pub fn with_volumes(
        root: impl Into<PathBuf>,
        device: impl Into<String>,
        volumes: Box<dyn VolumeOps>,
    ) -> Result<Self> {
        Ok(Self {
            layout: Layout::create(root)?,
            device: device.into(),
            volumes,
        })
    }

    fn delete_if_present(&self, path: &Path) {
        if path.exists() {
            if let Err(err) = self.volumes.delete(path) {
                tracing::warn!(subvolume = %path.display(), error = %err, "failed to delete subvolume");
            }
        }
    }
}

impl SnapshotDriver for BtrfsDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn create_active_storage(&self, active: &ActiveSnapshot) -> Result<()> {
        let target = self.layout.active_path(&active.id);
        let result = match active.parent_ids.first() {
            None => self.volumes.create(&target),
            Some(parent) => {
                let source = self.layout.committed_path(parent);
                self.volumes.snapshot(&source, &target, active.readonly)
            }
        };
        if result.is_err() {
            self.delete_if_present(&target);
        }
        result?;
        tracing::debug!(id = %active.id, readonly = active.readonly, "subvolume created");
        Ok(())
    }

    fn destroy_active_storage(&self, id: &SnapshotId) -> Result<()> {
        self.volumes.delete(&self.layout.active_path(id))
    }

    fn promote_to_committed(&self, id: &SnapshotId) -> Result<()> {
        let source = self.layout.active_path(id);
        let target = self.layout.committed_path(id);
        if let Err(err) = self.volumes.snapshot(&source, &target, true) {
            self.delete_if_present(&target);
            return Err(err);
        }
        Ok(())
    }

    fn revert_promotion(&self, id: &SnapshotId) -> Result<()> {
        self.volumes.delete(&self.layout.committed_path(id))
    }

    fn finish_promotion(&self, id: &SnapshotId) -> Result<()> {
        self.volumes.delete(&self.layout.active_path(id))
    }

    fn purge_marked(&self, marked: &MarkedRemoval) -> Result<()> {
        self.volumes.delete(&marked.marked)
    }

    fn discard(&self, path: &Path) -> Result<()> {
        if self.volumes.info(path).is_ok() {
            self.volumes.delete(path)
        } else {
            crate::fsutil::remove_path(path)
        }
    }

    fn build_mounts(&self, active: &ActiveSnapshot) -> Result<Vec<MountSpec>> {
        let info = self.volumes.info(&self.layout.active_path(&active.id))?;
        let mut options = vec![format!("subvolid={}", info.id)];
        if info.readonly || active.readonly {
            options.push("ro".into());
        }
        Ok(vec![MountSpec {
            fs_type: "btrfs".into(),
            source: self.device.clone(),
            options,
        }])
    }
}

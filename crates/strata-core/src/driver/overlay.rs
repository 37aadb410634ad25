//! `OverlayFS` driver.
//!
//! Each snapshot owns an `fs/` upper directory (plus `work/` when mutable).
//! Parents are never copied; they are stacked as `lowerdir` entries at mount
//! time, nearest parent first so that it shadows older ancestors.

use std::path::PathBuf;

use strata_common::error::Result;
use strata_common::types::{ActiveSnapshot, MountSpec, SnapshotId};

use super::{Layout, SnapshotDriver};
use crate::{fsutil, probe};

const UPPER_DIR: &str = "fs";
const WORK_DIR: &str = "work";

/// Driver that composes snapshots with union mounts.
#[derive(Debug)]
pub struct OverlayDriver {
    layout: Layout,
}

impl OverlayDriver {
    /// Registry name.
    pub const NAME: &'static str = "overlay";

    /// Opens the driver rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage areas cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Layout::create(root)?;
        if !probe::overlay_supported() {
            tracing::warn!("kernel does not list overlay support; mounts will fail");
        }
        tracing::info!(root = %layout.root().display(), "overlay driver ready");
        Ok(Self { layout })
    }

    fn upper_path(&self, id: &SnapshotId) -> PathBuf {
        self.layout.active_path(id).join(UPPER_DIR)
    }

    fn work_path(&self, id: &SnapshotId) -> PathBuf {
        self.layout.active_path(id).join(WORK_DIR)
    }

    fn parent_path(&self, id: &SnapshotId) -> PathBuf {
        self.layout.committed_path(id).join(UPPER_DIR)
    }
}

impl SnapshotDriver for OverlayDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn create_active_storage(&self, active: &ActiveSnapshot) -> Result<()> {
        let staged = self.layout.stage()?;
        fsutil::create_dir(&staged.path().join(UPPER_DIR), 0o755)?;
        if !active.readonly {
            fsutil::create_dir(&staged.path().join(WORK_DIR), 0o700)?;
        }
        staged.install(&self.layout.active_path(&active.id))?;
        tracing::debug!(id = %active.id, readonly = active.readonly, "overlay storage created");
        Ok(())
    }

    fn build_mounts(&self, active: &ActiveSnapshot) -> Result<Vec<MountSpec>> {
        if active.parent_ids.is_empty() {
            // A single layer cannot be an overlay.
            return Ok(vec![MountSpec::bind(
                self.upper_path(&active.id).to_string_lossy(),
                active.readonly,
            )]);
        }

        let mut options = Vec::new();
        if active.readonly {
            if let [parent] = active.parent_ids.as_slice() {
                return Ok(vec![MountSpec::bind(
                    self.parent_path(parent).to_string_lossy(),
                    true,
                )]);
            }
        } else {
            options.push(format!("workdir={}", self.work_path(&active.id).display()));
            options.push(format!("upperdir={}", self.upper_path(&active.id).display()));
        }

        let lowers = active
            .parent_ids
            .iter()
            .map(|id| self.parent_path(id).display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        options.push(format!("lowerdir={lowers}"));

        Ok(vec![MountSpec {
            fs_type: "overlay".into(),
            source: "overlay".into(),
            options,
        }])
    }
}

//! Plain-copy driver.
//!
//! Every active snapshot is a full physical copy of its nearest parent. No
//! storage is shared, so it works on any filesystem and mounts are always a
//! single bind mount.

use std::path::PathBuf;

use strata_common::error::Result;
use strata_common::types::{ActiveSnapshot, MountSpec};

use super::{Layout, SnapshotDriver};
use crate::fsutil;

/// Driver that copies parent trees into each new snapshot.
#[derive(Debug)]
pub struct NaiveDriver {
    layout: Layout,
}

impl NaiveDriver {
    /// Registry name.
    pub const NAME: &'static str = "naive";

    /// Opens the driver rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage areas cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Layout::create(root)?;
        tracing::info!(root = %layout.root().display(), "naive driver ready");
        Ok(Self { layout })
    }
}

impl SnapshotDriver for NaiveDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn create_active_storage(&self, active: &ActiveSnapshot) -> Result<()> {
        let staged = self.layout.stage()?;
        if let Some(parent) = active.parent_ids.first() {
            fsutil::copy_dir(&self.layout.committed_path(parent), staged.path())?;
        }
        staged.install(&self.layout.active_path(&active.id))?;
        tracing::debug!(id = %active.id, parents = active.parent_ids.len(), "naive storage created");
        Ok(())
    }

    fn build_mounts(&self, active: &ActiveSnapshot) -> Result<Vec<MountSpec>> {
        let source = self.layout.active_path(&active.id);
        Ok(vec![MountSpec::bind(
            source.to_string_lossy(),
            active.readonly,
        )])
    }
}

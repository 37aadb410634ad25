//! On-disk layout shared by every driver.
//!
//! ```text
//! <root>/
//!   active/<id>        in-progress storage units
//!   active/new-<uuid>  units being staged before they receive an ID
//!   snapshots/<id>     committed storage units
//!   <area>/rm-<id>     units renamed aside for removal
//! ```
//!
//! Staging and removal entries live in the area of their source so that the
//! final rename never crosses a filesystem boundary.

use std::path::{Path, PathBuf};

use strata_common::constants::{ACTIVE_DIR, COMMITTED_DIR, REMOVAL_PREFIX, STAGING_PREFIX};
use strata_common::error::{Result, SnapshotError};
use strata_common::types::{Kind, SnapshotId};

use crate::fsutil;

/// A storage unit renamed to its transient removal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedRemoval {
    /// ID of the removed snapshot.
    pub id: SnapshotId,
    /// Area the unit lived in.
    pub kind: Kind,
    /// Location before the rename.
    pub original: PathBuf,
    /// Current `rm-<id>` location.
    pub marked: PathBuf,
}

/// Paths of a driver root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    active: PathBuf,
    committed: PathBuf,
}

impl Layout {
    /// Creates the root and both storage areas if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let layout = Self {
            active: root.join(ACTIVE_DIR),
            committed: root.join(COMMITTED_DIR),
            root,
        };
        for dir in [&layout.root, &layout.active, &layout.committed] {
            std::fs::create_dir_all(dir).map_err(|e| SnapshotError::io(dir, e))?;
        }
        Ok(layout)
    }

    /// Returns the driver root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding the given kind of storage.
    #[must_use]
    pub fn area(&self, kind: Kind) -> &Path {
        match kind {
            Kind::Active => &self.active,
            Kind::Committed => &self.committed,
        }
    }

    /// Returns the storage path of `id` in the given area.
    #[must_use]
    pub fn path(&self, kind: Kind, id: &SnapshotId) -> PathBuf {
        self.area(kind).join(id.as_str())
    }

    /// Returns the storage path of an active snapshot.
    #[must_use]
    pub fn active_path(&self, id: &SnapshotId) -> PathBuf {
        self.path(Kind::Active, id)
    }

    /// Returns the storage path of a committed snapshot.
    #[must_use]
    pub fn committed_path(&self, id: &SnapshotId) -> PathBuf {
        self.path(Kind::Committed, id)
    }

    /// Creates a fresh staging directory in the active area.
    ///
    /// The directory is removed when the returned guard is dropped, unless it
    /// has been installed with [`StagedDir::install`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn stage(&self) -> Result<StagedDir> {
        let path = self
            .active
            .join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        fsutil::create_dir(&path, 0o700)?;
        Ok(StagedDir {
            path,
            installed: false,
        })
    }

    /// Moves a storage unit from the active area to the committed area.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn promote(&self, id: &SnapshotId) -> Result<()> {
        fsutil::rename(&self.active_path(id), &self.committed_path(id))
    }

    /// Moves a promoted storage unit back to the active area.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn demote(&self, id: &SnapshotId) -> Result<()> {
        fsutil::rename(&self.committed_path(id), &self.active_path(id))
    }

    /// Renames the storage of `id` to `rm-<id>` in the same area.
    ///
    /// Returns `None` if there is no storage to remove.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn mark_for_removal(&self, id: &SnapshotId, kind: Kind) -> Result<Option<MarkedRemoval>> {
        let original = self.path(kind, id);
        let marked = self
            .area(kind)
            .join(format!("{REMOVAL_PREFIX}{}", id.as_str()));
        match std::fs::rename(&original, &marked) {
            Ok(()) => Ok(Some(MarkedRemoval {
                id: id.clone(),
                kind,
                original,
                marked,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %original.display(), "no storage to remove");
                Ok(None)
            }
            Err(e) => Err(SnapshotError::io(&original, e)),
        }
    }

    /// Renames a marked unit back to its original location.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn restore(&self, marked: &MarkedRemoval) -> Result<()> {
        fsutil::rename(&marked.marked, &marked.original)
    }

    /// Lists entries of an area, split into storage units and transient
    /// staging or removal entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be read.
    pub fn scan(&self, kind: Kind) -> Result<AreaScan> {
        let area = self.area(kind);
        let mut scan = AreaScan::default();
        let entries = std::fs::read_dir(area).map_err(|e| SnapshotError::io(area, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| SnapshotError::io(area, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(STAGING_PREFIX) || name.starts_with(REMOVAL_PREFIX) {
                scan.transient.push(entry.path());
            } else {
                scan.units.push((SnapshotId::new(name), entry.path()));
            }
        }
        scan.units.sort();
        scan.transient.sort();
        Ok(scan)
    }
}

/// Contents of a storage area.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AreaScan {
    /// Storage units named by snapshot ID.
    pub units: Vec<(SnapshotId, PathBuf)>,
    /// Leftover `new-*` and `rm-*` entries.
    pub transient: Vec<PathBuf>,
}

/// Staging directory removed on drop unless installed.
#[derive(Debug)]
pub struct StagedDir {
    path: PathBuf,
    installed: bool,
}

impl StagedDir {
    /// Returns the staging path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the staged directory to `target`, consuming the guard.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails. The staging directory is then
    /// removed.
    pub fn install(mut self, target: &Path) -> Result<()> {
        fsutil::rename(&self.path, target)?;
        self.installed = true;
        Ok(())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if self.installed {
            return;
        }
        if let Err(err) = fsutil::remove_path(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove staging directory");
        }
    }
}

//! Snapshotter configuration model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};

/// Root configuration for a snapshotter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotterConfig {
    /// Base directory holding the metadata file and the storage areas.
    pub root: PathBuf,
    /// Name of the storage driver, looked up in the driver registry.
    pub driver: String,
    /// Settings for the btrfs volume driver.
    pub btrfs: BtrfsConfig,
    /// Whether leftover staging and removal entries are swept on open.
    pub sweep_on_open: bool,
}

/// Settings for the btrfs driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtrfsConfig {
    /// Block device holding the btrfs filesystem, used as mount source.
    pub device: Option<String>,
}

impl Default for SnapshotterConfig {
    fn default() -> Self {
        Self {
            root: crate::constants::root_dir().join(crate::constants::DEFAULT_DRIVER),
            driver: crate::constants::DEFAULT_DRIVER.into(),
            btrfs: BtrfsConfig::default(),
            sweep_on_open: true,
        }
    }
}

impl SnapshotterConfig {
    /// Creates a configuration for `driver` rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, driver: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| SnapshotError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Config` if the root or driver name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(SnapshotError::Config {
                message: "root must not be empty".into(),
            });
        }
        if self.driver.trim().is_empty() {
            return Err(SnapshotError::Config {
                message: "driver must not be empty".into(),
            });
        }
        Ok(())
    }
}

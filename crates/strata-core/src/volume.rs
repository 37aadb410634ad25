//! Copy-on-write volume operations.
//!
//! The btrfs driver manipulates subvolumes through [`VolumeOps`]. The
//! production implementation drives the `btrfs` tool; anything able to
//! create, clone, and delete volumes by path can stand in for it.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use strata_common::error::{Result, SnapshotError};

/// Identity and flags of a subvolume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubvolumeInfo {
    /// Numeric subvolume ID, used as the `subvolid=` mount option.
    pub id: u64,
    /// Whether the subvolume is readonly.
    pub readonly: bool,
}

/// Subvolume manipulation by path.
pub trait VolumeOps: Send + Sync + fmt::Debug {
    /// Creates an empty subvolume at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subvolume cannot be created.
    fn create(&self, path: &Path) -> Result<()>;

    /// Creates `target` as a copy-on-write snapshot of `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be taken.
    fn snapshot(&self, source: &Path, target: &Path, readonly: bool) -> Result<()>;

    /// Deletes the subvolume at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subvolume cannot be deleted.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Returns the ID and flags of the subvolume at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a subvolume.
    fn info(&self, path: &Path) -> Result<SubvolumeInfo>;
}

/// [`VolumeOps`] backed by the `btrfs` command-line tool.
#[derive(Debug, Clone)]
pub struct BtrfsCommand {
    binary: PathBuf,
}

impl BtrfsCommand {
    /// Locates the `btrfs` tool on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Config` if the tool is not installed.
    pub fn locate() -> Result<Self> {
        let binary = which::which("btrfs").map_err(|e| SnapshotError::Config {
            message: format!("btrfs tool not found: {e}"),
        })?;
        Ok(Self { binary })
    }

    /// Uses the given binary instead of searching `PATH`.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<String> {
        let rendered = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %rendered, "running btrfs");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| SnapshotError::io(&self.binary, e))?;
        if !output.status.success() {
            return Err(SnapshotError::Storage {
                message: format!(
                    "btrfs {rendered} failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VolumeOps for BtrfsCommand {
    fn create(&self, path: &Path) -> Result<()> {
        let _ = self.run(&["subvolume".as_ref(), "create".as_ref(), path.as_os_str()])?;
        Ok(())
    }

    fn snapshot(&self, source: &Path, target: &Path, readonly: bool) -> Result<()> {
        let mut args: Vec<&OsStr> = vec!["subvolume".as_ref(), "snapshot".as_ref()];
        if readonly {
            args.push("-r".as_ref());
        }
        args.push(source.as_os_str());
        args.push(target.as_os_str());
        let _ = self.run(&args)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let _ = self.run(&["subvolume".as_ref(), "delete".as_ref(), path.as_os_str()])?;
        Ok(())
    }

    fn info(&self, path: &Path) -> Result<SubvolumeInfo> {
        let output = self.run(&["subvolume".as_ref(), "show".as_ref(), path.as_os_str()])?;
        parse_subvolume_show(&output).ok_or_else(|| SnapshotError::Storage {
            message: format!("unrecognized `btrfs subvolume show` output for {}", path.display()),
        })
    }
}

/// Extracts the subvolume ID and readonly flag from `btrfs subvolume show`.
fn parse_subvolume_show(output: &str) -> Option<SubvolumeInfo> {
    let mut id = None;
    let mut readonly = false;
    for line in output.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        match field.trim() {
            "Subvolume ID" => id = value.trim().parse().ok(),
            "Flags" => readonly = value.split_whitespace().any(|f| f == "readonly"),
            _ => {}
        }
    }
    id.map(|id| SubvolumeInfo { id, readonly })
}

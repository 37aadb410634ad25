//! Host capability probing for driver selection.

use std::path::Path;

use strata_common::error::{Result, SnapshotError};

/// Returns whether the running kernel lists `overlay` in `/proc/filesystems`.
#[must_use]
pub fn overlay_supported() -> bool {
    std::fs::read_to_string("/proc/filesystems")
        .map(|content| filesystems_list(&content, "overlay"))
        .unwrap_or(false)
}

fn filesystems_list(content: &str, fs_name: &str) -> bool {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|name| name == fs_name)
}

/// Returns whether `path` lives on a btrfs filesystem.
///
/// # Errors
///
/// Returns an error if `statfs(2)` fails for `path`.
#[cfg(target_os = "linux")]
pub fn is_btrfs(path: &Path) -> Result<bool> {
    use nix::sys::statfs::{BTRFS_SUPER_MAGIC, statfs};

    let stat = statfs(path).map_err(|e| SnapshotError::io(path, e.into()))?;
    Ok(stat.filesystem_type() == BTRFS_SUPER_MAGIC)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, since btrfs snapshots require Linux.
#[cfg(not(target_os = "linux"))]
pub fn is_btrfs(_path: &Path) -> Result<bool> {
    Err(SnapshotError::Config {
        message: "Linux required for btrfs snapshots".into(),
    })
}

//! Filesystem helpers shared by the directory-backed drivers.

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::Path;

use strata_common::error::{Result, SnapshotError};

/// Recursively copies the contents of `src` into the existing directory `dst`.
///
/// Regular files, directories, symlinks, FIFOs, and device nodes are
/// reproduced with their permission bits. Ownership is copied when the
/// process is allowed to change it. Sockets are skipped.
///
/// # Errors
///
/// Returns an error if any entry cannot be read or recreated.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    tracing::debug!(src = %src.display(), dst = %dst.display(), "copying directory tree");
    let meta = fs::symlink_metadata(src).map_err(|e| SnapshotError::io(src, e))?;
    copy_dir_recursive(src, dst)?;
    apply_metadata(dst, &meta)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src).map_err(|e| SnapshotError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = fs::symlink_metadata(&from).map_err(|e| SnapshotError::io(&from, e))?;
        let file_type = meta.file_type();

        if file_type.is_dir() {
            fs::create_dir(&to).map_err(|e| SnapshotError::io(&to, e))?;
            copy_dir_recursive(&from, &to)?;
            apply_metadata(&to, &meta)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| SnapshotError::io(&from, e))?;
            std::os::unix::fs::symlink(&target, &to).map_err(|e| SnapshotError::io(&to, e))?;
            chown_best_effort(&to, &meta)?;
        } else if file_type.is_file() {
            let _ = fs::copy(&from, &to).map_err(|e| SnapshotError::io(&from, e))?;
            apply_metadata(&to, &meta)?;
        } else if file_type.is_fifo() || file_type.is_char_device() || file_type.is_block_device()
        {
            make_node(&to, &meta)?;
            apply_metadata(&to, &meta)?;
        } else {
            tracing::debug!(path = %from.display(), "skipping socket");
        }
    }
    Ok(())
}

fn make_node(path: &Path, meta: &fs::Metadata) -> Result<()> {
    use nix::sys::stat::{Mode, SFlag, mknod};

    let file_type = meta.file_type();
    let kind = if file_type.is_fifo() {
        SFlag::S_IFIFO
    } else if file_type.is_char_device() {
        SFlag::S_IFCHR
    } else {
        SFlag::S_IFBLK
    };
    let perm = Mode::from_bits_truncate(meta.mode() & 0o7777);
    mknod(path, kind, perm, meta.rdev()).map_err(|e| SnapshotError::io(path, e.into()))
}

fn apply_metadata(path: &Path, meta: &fs::Metadata) -> Result<()> {
    chown_best_effort(path, meta)?;
    fs::set_permissions(path, fs::Permissions::from_mode(meta.mode() & 0o7777))
        .map_err(|e| SnapshotError::io(path, e))
}

fn chown_best_effort(path: &Path, meta: &fs::Metadata) -> Result<()> {
    match std::os::unix::fs::lchown(path, Some(meta.uid()), Some(meta.gid())) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::trace!(path = %path.display(), "ownership not preserved");
            Ok(())
        }
        Err(e) => Err(SnapshotError::io(path, e)),
    }
}

/// Removes a file or directory tree. A missing path is not an error.
///
/// # Errors
///
/// Returns an error if the path exists and cannot be removed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SnapshotError::io(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| SnapshotError::io(path, e))
}

/// Renames `from` to `to`. Both must live on the same filesystem.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    tracing::debug!(from = %from.display(), to = %to.display(), "renaming");
    fs::rename(from, to).map_err(|e| SnapshotError::io(from, e))
}

/// Creates a single directory with the given permission bits.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn create_dir(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .mode(mode)
        .create(path)
        .map_err(|e| SnapshotError::io(path, e))
}

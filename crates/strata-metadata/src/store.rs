//! Durable handle over the metadata file.
//!
//! The committed record set is held in memory behind an `Arc`. Readers clone
//! the `Arc` and never block on a writer; a writer holds the single writer
//! lock for the lifetime of its transaction and works on its own copy. A
//! commit persists the copy with write-to-temp, `fsync`, and rename, and only
//! then publishes it to new readers.
//!
//! An advisory lock on `<metadata>.lock` keeps a second handle, in this or
//! another process, from opening the same store.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use fs2::FileExt;
use strata_common::constants::METADATA_VERSION;
use strata_common::context::Context;
use strata_common::error::{Result, SnapshotError};

use crate::schema::StoreState;
use crate::transaction::Transaction;

/// Transactional store of snapshot records.
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    state: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
    _lock: File,
}

impl MetaStore {
    /// Opens the store at `path`, creating an empty one if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::StoreUnavailable` if the file cannot be read,
    /// is corrupt, carries an unknown schema version, or is already open.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&path, &e))?;
        }
        let lock = acquire_lock(&path)?;

        let state = if path.exists() {
            let content = std::fs::read(&path).map_err(|e| unavailable(&path, &e))?;
            let state: StoreState =
                serde_json::from_slice(&content).map_err(|e| unavailable(&path, &e))?;
            if state.version != METADATA_VERSION {
                return Err(SnapshotError::StoreUnavailable {
                    path,
                    message: format!("unsupported metadata version {}", state.version),
                });
            }
            state
        } else {
            let state = StoreState::default();
            persist(&path, &state)?;
            state
        };

        tracing::info!(
            path = %path.display(),
            active = state.active.len(),
            committed = state.committed.len(),
            "metadata store opened"
        );
        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            _lock: lock,
        })
    }

    /// Returns the path of the metadata file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begins a transaction.
    ///
    /// Readonly transactions see the last committed state and never block.
    /// Writable transactions wait for the writer lock.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Cancelled` if `ctx` is already cancelled, or
    /// `SnapshotError::StoreUnavailable` if a lock is poisoned.
    pub fn begin(&self, ctx: &Context, writable: bool) -> Result<Transaction<'_>> {
        ctx.check()?;
        let writer = if writable {
            Some(self.writer.lock().map_err(|_| self.poisoned())?)
        } else {
            None
        };
        let state = self.current()?;
        tracing::trace!(writable, "transaction started");
        Ok(Transaction::new(self, ctx.clone(), state, writer))
    }

    pub(crate) fn current(&self) -> Result<Arc<StoreState>> {
        let guard = self.state.read().map_err(|_| self.poisoned())?;
        Ok(Arc::clone(&guard))
    }

    /// Persists `state` and publishes it to subsequent transactions.
    pub(crate) fn publish(&self, state: Arc<StoreState>) -> Result<()> {
        persist(&self.path, &state)?;
        let mut guard = self.state.write().map_err(|_| self.poisoned())?;
        *guard = state;
        Ok(())
    }

    fn poisoned(&self) -> SnapshotError {
        SnapshotError::StoreUnavailable {
            path: self.path.clone(),
            message: "store lock poisoned".into(),
        }
    }
}

fn unavailable(path: &Path, err: &dyn std::fmt::Display) -> SnapshotError {
    SnapshotError::StoreUnavailable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| unavailable(&lock_path, &e))?;
    file.try_lock_exclusive()
        .map_err(|e| SnapshotError::StoreUnavailable {
            path: path.to_path_buf(),
            message: format!("store is already open: {e}"),
        })?;
    Ok(file)
}

/// Atomically replaces the metadata file with `state`.
fn persist(path: &Path, state: &StoreState) -> Result<()> {
    let json = serde_json::to_vec_pretty(state).map_err(|e| unavailable(path, &e))?;
    let tmp = path.with_extension("json.tmp");

    let mut file = File::create(&tmp).map_err(|e| unavailable(&tmp, &e))?;
    file.write_all(&json).map_err(|e| unavailable(&tmp, &e))?;
    file.sync_all().map_err(|e| unavailable(&tmp, &e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| unavailable(path, &e))?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            // Directory fsync is not supported everywhere.
            let _ = dir.sync_all();
        }
    }
    tracing::debug!(path = %path.display(), bytes = json.len(), "metadata persisted");
    Ok(())
}

//! Snapshot operations over one metadata store and one storage driver.
//!
//! Each mutating operation follows the same shape: begin a writable
//! transaction, change the records, do the filesystem work, then commit.
//! If the filesystem work fails the transaction is rolled back. If the
//! commit fails the filesystem work is compensated. Compensation failures
//! are logged and never replace the error that triggered them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use strata_common::config::SnapshotterConfig;
use strata_common::constants::{METADATA_FILE, REMOVAL_PREFIX};
use strata_common::context::Context;
use strata_common::error::Result;
use strata_common::types::{Info, Kind, Labels, MountSpec, SnapshotId};
use strata_core::driver::{MarkedRemoval, SnapshotDriver};
use strata_metadata::{MetaStore, Transaction};

use crate::registry::DriverRegistry;

/// Outcome of a [`Snapshotter::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Staging entries, removal entries of dead records, and units that were
    /// never recorded. All were deleted.
    pub reclaimed: Vec<PathBuf>,
    /// Removal entries of live records, renamed back into place.
    pub restored: Vec<PathBuf>,
    /// Units of interrupted commits, moved back in step with their record.
    pub recovered: Vec<PathBuf>,
    /// Storage units with no matching record. They are left in place.
    pub orphans: Vec<PathBuf>,
}

impl SweepReport {
    /// Returns whether the sweep found nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty()
            && self.restored.is_empty()
            && self.recovered.is_empty()
            && self.orphans.is_empty()
    }
}

/// Record IDs of both kinds, taken at the start of a sweep.
struct KnownIds {
    active: BTreeSet<SnapshotId>,
    committed: BTreeSet<SnapshotId>,
    next_id: u64,
}

impl KnownIds {
    const fn of(&self, kind: Kind) -> &BTreeSet<SnapshotId> {
        match kind {
            Kind::Active => &self.active,
            Kind::Committed => &self.committed,
        }
    }

    /// Whether `id` lies beyond the persisted sequence, so no record ever
    /// carried it.
    fn never_allocated(&self, id: &SnapshotId) -> bool {
        sequence_value(id).is_some_and(|value| value >= self.next_id)
    }
}

/// Snapshot manager shared by all callers of one storage root.
///
/// `Snapshotter` is `Send + Sync`; share it through an `Arc`.
#[derive(Debug)]
pub struct Snapshotter {
    store: MetaStore,
    driver: Box<dyn SnapshotDriver>,
}

impl Snapshotter {
    /// Opens the driver named in `config` and its metadata store.
    ///
    /// The metadata file lives at the driver root. When
    /// `config.sweep_on_open` is set, leftovers of interrupted operations are
    /// swept before the snapshotter is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be built, the store cannot be
    /// opened, or the sweep fails.
    pub fn open(config: &SnapshotterConfig, registry: &DriverRegistry) -> Result<Self> {
        let driver = registry.open(config)?;
        let store = MetaStore::open(driver.layout().root().join(METADATA_FILE))?;
        let snapshotter = Self::new(store, driver);
        if config.sweep_on_open {
            let report = snapshotter.sweep(&Context::background())?;
            if !report.is_empty() {
                tracing::info!(
                    reclaimed = report.reclaimed.len(),
                    restored = report.restored.len(),
                    recovered = report.recovered.len(),
                    orphans = report.orphans.len(),
                    "startup sweep finished"
                );
            }
        }
        Ok(snapshotter)
    }

    /// Pairs an opened store with a driver.
    #[must_use]
    pub fn new(store: MetaStore, driver: Box<dyn SnapshotDriver>) -> Self {
        Self { store, driver }
    }

    /// Returns the name of the storage driver.
    #[must_use]
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Returns the driver root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.driver.layout().root()
    }

    /// Describes the snapshot named `key`, active or committed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if no snapshot has this key.
    pub fn stat(&self, ctx: &Context, key: &str) -> Result<Info> {
        let tx = self.store.begin(ctx, false)?;
        let info = tx.get_info(key);
        abort(tx);
        info
    }

    /// Creates a writable active snapshot on top of the committed `parent`
    /// and returns its mounts. An empty `parent` creates a base layer.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::AlreadyExists` if `key` is active,
    /// `SnapshotError::NotFound` if `parent` is not committed, or a storage
    /// or store error. Nothing is left behind on failure.
    pub fn prepare(&self, ctx: &Context, key: &str, parent: &str) -> Result<Vec<MountSpec>> {
        self.create_active(ctx, key, parent, false, Labels::new())
    }

    /// Like [`Self::prepare`], attaching `labels` to the new snapshot.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`].
    pub fn prepare_with_labels(
        &self,
        ctx: &Context,
        key: &str,
        parent: &str,
        labels: Labels,
    ) -> Result<Vec<MountSpec>> {
        self.create_active(ctx, key, parent, false, labels)
    }

    /// Creates a readonly view of the committed `parent`.
    ///
    /// Views can be mounted and removed but never committed.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`].
    pub fn view(&self, ctx: &Context, key: &str, parent: &str) -> Result<Vec<MountSpec>> {
        self.create_active(ctx, key, parent, true, Labels::new())
    }

    /// Like [`Self::view`], attaching `labels` to the new snapshot.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`].
    pub fn view_with_labels(
        &self,
        ctx: &Context,
        key: &str,
        parent: &str,
        labels: Labels,
    ) -> Result<Vec<MountSpec>> {
        self.create_active(ctx, key, parent, true, labels)
    }

    /// Returns the mounts of the active snapshot `key`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` is not active.
    pub fn mounts(&self, ctx: &Context, key: &str) -> Result<Vec<MountSpec>> {
        let tx = self.store.begin(ctx, false)?;
        let active = tx.get_active(key);
        abort(tx);
        self.driver.build_mounts(&active?)
    }

    /// Commits the active snapshot `key` as the immutable snapshot `name`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` is not active,
    /// `SnapshotError::AlreadyExists` if `name` is taken,
    /// `SnapshotError::InvalidState` if `key` is a view, or a storage or
    /// store error. On failure the active snapshot is left as it was.
    pub fn commit(&self, ctx: &Context, name: &str, key: &str) -> Result<()> {
        let mut tx = self.store.begin(ctx, true)?;
        let id = tx.commit_active(key, name)?;
        self.driver.promote_to_committed(&id)?;

        if let Err(err) = tx.commit() {
            if let Err(revert) = self.driver.revert_promotion(&id) {
                tracing::warn!(id = %id, error = %revert, "failed to revert promotion");
            }
            return Err(err);
        }
        if let Err(err) = self.driver.finish_promotion(&id) {
            tracing::warn!(id = %id, error = %err, "failed to clean up promoted storage");
        }

        tracing::info!(key, name, id = %id, "snapshot committed");
        Ok(())
    }

    /// Removes the snapshot `key`, active or committed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` names nothing,
    /// `SnapshotError::InUse` if a committed snapshot still has children, or
    /// a storage or store error. On failure the snapshot is left as it was.
    pub fn remove(&self, ctx: &Context, key: &str) -> Result<()> {
        let mut tx = self.store.begin(ctx, true)?;
        let (id, kind) = tx.remove(key)?;
        let marked = self.driver.mark_for_removal(&id, kind)?;

        if let Err(err) = tx.commit() {
            if let Some(marked) = &marked {
                if let Err(restore) = self.driver.restore_marked(marked) {
                    tracing::warn!(
                        path = %marked.marked.display(),
                        error = %restore,
                        "failed to restore storage marked for removal"
                    );
                }
            }
            return Err(err);
        }

        match marked {
            Some(marked) => {
                if let Err(err) = self.driver.purge_marked(&marked) {
                    tracing::warn!(
                        path = %marked.marked.display(),
                        error = %err,
                        "failed to purge removed storage"
                    );
                }
            }
            None => tracing::debug!(id = %id, "removed snapshot had no storage"),
        }

        tracing::info!(key, id = %id, %kind, "snapshot removed");
        Ok(())
    }

    /// Visits every snapshot, committed ones first, each kind in name order.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`.
    pub fn walk<F>(&self, ctx: &Context, visit: F) -> Result<()>
    where
        F: FnMut(&Info) -> Result<()>,
    {
        let tx = self.store.begin(ctx, false)?;
        let result = tx.walk_info(visit);
        abort(tx);
        result
    }

    /// Brings storage back in step with the records after a crash.
    ///
    /// - `new-*` staging entries are deleted.
    /// - `rm-<id>` entries are renamed back when `<id>` still has a record of
    ///   that kind, and deleted otherwise.
    /// - A committed-area unit whose ID belongs to an active record is an
    ///   interrupted commit; the promotion is reverted.
    /// - An active-area unit whose ID belongs to a committed record is a
    ///   promotion whose cleanup never ran; the cleanup is finished.
    /// - An active-area unit whose ID was never allocated is deleted.
    /// - Any other unit without a record is reported and left in place.
    ///
    /// Finally the ID sequence is advanced past every ID still named on
    /// disk. Runs under the writer lock so no operation is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or an area cannot be
    /// listed. Failures on individual entries are logged and the entry is
    /// reported as an orphan.
    pub fn sweep(&self, ctx: &Context) -> Result<SweepReport> {
        let mut tx = self.store.begin(ctx, true)?;
        let known = KnownIds {
            active: tx.ids(Kind::Active)?,
            committed: tx.ids(Kind::Committed)?,
            next_id: tx.next_id()?,
        };

        let mut report = SweepReport::default();
        for kind in [Kind::Active, Kind::Committed] {
            let scan = self.driver.layout().scan(kind)?;
            for path in scan.transient {
                self.sweep_transient(kind, &known, path, &mut report);
            }
            for (id, path) in scan.units {
                if !known.of(kind).contains(&id) {
                    self.sweep_unit(kind, &id, path, &known, &mut report);
                }
            }
        }

        if let Some(last) = self.highest_id_on_disk()? {
            let _ = tx.reserve_ids_through(last)?;
        }
        tx.commit()?;
        Ok(report)
    }

    fn sweep_transient(
        &self,
        kind: Kind,
        known: &KnownIds,
        path: PathBuf,
        report: &mut SweepReport,
    ) {
        if let Some(id) = removal_id(&path).filter(|id| known.of(kind).contains(id)) {
            let marked = MarkedRemoval {
                original: self.driver.layout().path(kind, &id),
                id,
                kind,
                marked: path,
            };
            if marked.original.exists() {
                tracing::warn!(
                    path = %marked.marked.display(),
                    "live storage already in place, keeping removal entry"
                );
                report.orphans.push(marked.marked);
                return;
            }
            match self.driver.restore_marked(&marked) {
                Ok(()) => {
                    tracing::info!(id = %marked.id, %kind, "restored storage of live snapshot");
                    report.restored.push(marked.original);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %marked.marked.display(),
                        error = %err,
                        "failed to restore storage"
                    );
                    report.orphans.push(marked.marked);
                }
            }
            return;
        }
        self.reclaim(path, report);
    }

    fn sweep_unit(
        &self,
        kind: Kind,
        id: &SnapshotId,
        path: PathBuf,
        known: &KnownIds,
        report: &mut SweepReport,
    ) {
        let recovery = match kind {
            Kind::Committed if known.active.contains(id) => self.driver.revert_promotion(id),
            Kind::Active if known.committed.contains(id) => self.driver.finish_promotion(id),
            Kind::Active if known.never_allocated(id) => {
                self.reclaim(path, report);
                return;
            }
            _ => {
                tracing::warn!(path = %path.display(), %kind, "storage unit has no record");
                report.orphans.push(path);
                return;
            }
        };
        match recovery {
            Ok(()) if !path.exists() => {
                tracing::info!(id = %id, %kind, "recovered interrupted commit");
                report.recovered.push(path);
            }
            Ok(()) => {
                tracing::warn!(path = %path.display(), %kind, "storage unit left in place");
                report.orphans.push(path);
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to recover interrupted commit"
                );
                report.orphans.push(path);
            }
        }
    }

    fn reclaim(&self, path: PathBuf, report: &mut SweepReport) {
        match self.driver.discard(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "reclaimed leftover entry");
                report.reclaimed.push(path);
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to reclaim leftover entry"
                );
                report.orphans.push(path);
            }
        }
    }

    /// Largest numeric ID naming a unit or removal entry in either area.
    fn highest_id_on_disk(&self) -> Result<Option<u64>> {
        let mut highest = None;
        for kind in [Kind::Active, Kind::Committed] {
            let scan = self.driver.layout().scan(kind)?;
            let units = scan.units.iter().filter_map(|(id, _)| sequence_value(id));
            let marked = scan
                .transient
                .iter()
                .filter_map(|path| removal_id(path))
                .filter_map(|id| sequence_value(&id));
            highest = units.chain(marked).chain(highest).max();
        }
        Ok(highest)
    }

    fn create_active(
        &self,
        ctx: &Context,
        key: &str,
        parent: &str,
        readonly: bool,
        labels: Labels,
    ) -> Result<Vec<MountSpec>> {
        let mut tx = self.store.begin(ctx, true)?;
        let active = tx.create_active(key, parent, readonly, labels)?;
        self.driver.create_active_storage(&active)?;

        let committed = self
            .driver
            .build_mounts(&active)
            .and_then(|mounts| tx.commit().map(|()| mounts));
        let mounts = match committed {
            Ok(mounts) => mounts,
            Err(err) => {
                if let Err(destroy) = self.driver.destroy_active_storage(&active.id) {
                    tracing::warn!(id = %active.id, error = %destroy, "failed to destroy new storage");
                }
                return Err(err);
            }
        };

        tracing::info!(key, parent, id = %active.id, readonly, "active snapshot created");
        Ok(mounts)
    }
}

/// Parses the ID out of an `rm-<id>` entry.
fn removal_id(path: &Path) -> Option<SnapshotId> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(REMOVAL_PREFIX)
        .filter(|id| !id.is_empty())
        .map(SnapshotId::new)
}

fn sequence_value(id: &SnapshotId) -> Option<u64> {
    id.as_str().parse().ok()
}

/// Resolves a transaction that made no changes.
fn abort(mut tx: Transaction<'_>) {
    if let Err(err) = tx.rollback() {
        tracing::warn!(error = %err, "failed to roll back transaction");
    }
}

//! End-to-end tests of the snapshotter against every storage driver.
//!
//! The naive and overlay drivers run on a scratch directory. The btrfs driver
//! runs over a directory-backed stand-in for subvolume operations, so the
//! tests need neither root nor a btrfs filesystem. Overlay mounts are only
//! built, never mounted.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_common::config::SnapshotterConfig;
use strata_common::context::Context;
use strata_common::error::{ErrorKind, Result, SnapshotError};
use strata_common::types::{ActiveSnapshot, Info, Kind, MountSpec, SnapshotId};
use strata_core::driver::btrfs::BtrfsDriver;
use strata_core::driver::naive::NaiveDriver;
use strata_core::driver::{Layout, MarkedRemoval, SnapshotDriver};
use strata_core::volume::{SubvolumeInfo, VolumeOps};
use strata_metadata::MetaStore;
use strata_snapshotter::{DriverRegistry, Snapshotter};

// ── Fixtures ─────────────────────────────────────────────────────────

const DRIVERS: [&str; 3] = ["naive", "overlay", "btrfs-dir"];
const SUBVOL_META: &str = ".subvol";

/// Subvolumes emulated as plain directories carrying a small id file.
#[derive(Debug, Default)]
struct DirVolumes {
    next: AtomicU64,
}

impl DirVolumes {
    fn tag(&self, path: &Path, readonly: bool) -> Result<()> {
        let id = 256 + self.next.fetch_add(1, Ordering::SeqCst);
        std::fs::write(path.join(SUBVOL_META), format!("{id} {readonly}"))
            .map_err(|e| SnapshotError::io(path, e))
    }
}

impl VolumeOps for DirVolumes {
    fn create(&self, path: &Path) -> Result<()> {
        std::fs::create_dir(path).map_err(|e| SnapshotError::io(path, e))?;
        self.tag(path, false)
    }

    fn snapshot(&self, source: &Path, target: &Path, readonly: bool) -> Result<()> {
        std::fs::create_dir(target).map_err(|e| SnapshotError::io(target, e))?;
        strata_core::fsutil::copy_dir(source, target)?;
        self.tag(target, readonly)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).map_err(|e| SnapshotError::io(path, e))
    }

    fn info(&self, path: &Path) -> Result<SubvolumeInfo> {
        let raw = std::fs::read_to_string(path.join(SUBVOL_META))
            .map_err(|e| SnapshotError::io(path, e))?;
        let (id, readonly) = raw.split_once(' ').ok_or_else(|| SnapshotError::Storage {
            message: format!("bad subvolume tag in {}", path.display()),
        })?;
        Ok(SubvolumeInfo {
            id: id.parse().map_err(|_| SnapshotError::Storage {
                message: format!("bad subvolume id in {}", path.display()),
            })?,
            readonly: readonly == "true",
        })
    }
}

fn registry() -> DriverRegistry {
    let mut registry = DriverRegistry::builtin();
    registry
        .register("btrfs-dir", |config: &SnapshotterConfig| {
            let driver = BtrfsDriver::with_volumes(
                &config.root,
                "/dev/vdb",
                Box::<DirVolumes>::default(),
            )?;
            Ok(Box::new(driver) as Box<dyn SnapshotDriver>)
        })
        .expect("register");
    registry
}

fn config(root: &Path, driver: &str) -> SnapshotterConfig {
    let mut config = SnapshotterConfig::new(root.join(driver), driver);
    config.sweep_on_open = false;
    config
}

fn open(driver: &str) -> (tempfile::TempDir, Snapshotter) {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshotter = Snapshotter::open(&config(dir.path(), driver), &registry()).expect("open");
    (dir, snapshotter)
}

/// Lists storage units of an area, ignoring transient entries.
fn units(root: &Path, area: &str) -> Vec<PathBuf> {
    let mut units: Vec<PathBuf> = std::fs::read_dir(root.join(area))
        .expect("read area")
        .map(|e| e.expect("entry").path())
        .filter(|p| {
            let name = p.file_name().expect("name").to_string_lossy().into_owned();
            !name.starts_with("new-") && !name.starts_with("rm-")
        })
        .collect();
    units.sort();
    units
}

fn entries(root: &Path, area: &str) -> usize {
    std::fs::read_dir(root.join(area)).expect("read area").count()
}

fn unit_id(unit: &Path) -> u64 {
    unit.file_name()
        .expect("name")
        .to_string_lossy()
        .parse()
        .expect("numeric id")
}

/// Directory holding the snapshot's file tree inside a storage unit.
fn data_dir(snapshotter: &Snapshotter, unit: &Path) -> PathBuf {
    if snapshotter.driver_name() == "overlay" {
        unit.join("fs")
    } else {
        unit.to_path_buf()
    }
}

/// Prepares `key` and returns the storage unit it received.
fn prepare_unit(snapshotter: &Snapshotter, key: &str, parent: &str) -> PathBuf {
    let before = units(snapshotter.root(), "active");
    let _ = snapshotter
        .prepare(&Context::background(), key, parent)
        .expect("prepare");
    units(snapshotter.root(), "active")
        .into_iter()
        .find(|u| !before.contains(u))
        .expect("new storage unit")
}

fn committed_unit(snapshotter: &Snapshotter, unit: &Path) -> PathBuf {
    snapshotter
        .root()
        .join("snapshots")
        .join(unit.file_name().expect("name"))
}

/// Creates a committed base layer holding `hello` and returns its storage.
fn commit_base(snapshotter: &Snapshotter, name: &str) -> PathBuf {
    let unit = prepare_unit(snapshotter, &format!("{name}-work"), "");
    std::fs::write(data_dir(snapshotter, &unit).join("hello"), "hi").expect("write");
    snapshotter
        .commit(&Context::background(), name, &format!("{name}-work"))
        .expect("commit");
    committed_unit(snapshotter, &unit)
}

fn names(snapshotter: &Snapshotter) -> Vec<(String, Kind)> {
    let mut seen = Vec::new();
    snapshotter
        .walk(&Context::background(), |info: &Info| {
            seen.push((info.name.clone(), info.kind));
            Ok(())
        })
        .expect("walk");
    seen
}

// ── Fault injection ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Fault {
    FailCreate,
    FailPromote,
    CancelAfterCreate(Context),
    CancelAfterPromote(Context),
    CancelAfterMark(Context),
}

/// Wraps a real driver and injects one fault.
#[derive(Debug)]
struct Faulty {
    inner: Box<dyn SnapshotDriver>,
    fault: Fault,
}

fn injected() -> SnapshotError {
    SnapshotError::Storage {
        message: "injected failure".into(),
    }
}

impl SnapshotDriver for Faulty {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn layout(&self) -> &Layout {
        self.inner.layout()
    }

    fn create_active_storage(&self, active: &ActiveSnapshot) -> Result<()> {
        match &self.fault {
            Fault::FailCreate => Err(injected()),
            Fault::CancelAfterCreate(ctx) => {
                self.inner.create_active_storage(active)?;
                ctx.cancel();
                Ok(())
            }
            _ => self.inner.create_active_storage(active),
        }
    }

    fn destroy_active_storage(&self, id: &SnapshotId) -> Result<()> {
        self.inner.destroy_active_storage(id)
    }

    fn promote_to_committed(&self, id: &SnapshotId) -> Result<()> {
        match &self.fault {
            Fault::FailPromote => Err(injected()),
            Fault::CancelAfterPromote(ctx) => {
                self.inner.promote_to_committed(id)?;
                ctx.cancel();
                Ok(())
            }
            _ => self.inner.promote_to_committed(id),
        }
    }

    fn revert_promotion(&self, id: &SnapshotId) -> Result<()> {
        self.inner.revert_promotion(id)
    }

    fn finish_promotion(&self, id: &SnapshotId) -> Result<()> {
        self.inner.finish_promotion(id)
    }

    fn mark_for_removal(&self, id: &SnapshotId, kind: Kind) -> Result<Option<MarkedRemoval>> {
        let marked = self.inner.mark_for_removal(id, kind)?;
        if let Fault::CancelAfterMark(ctx) = &self.fault {
            ctx.cancel();
        }
        Ok(marked)
    }

    fn restore_marked(&self, marked: &MarkedRemoval) -> Result<()> {
        self.inner.restore_marked(marked)
    }

    fn purge_marked(&self, marked: &MarkedRemoval) -> Result<()> {
        self.inner.purge_marked(marked)
    }

    fn discard(&self, path: &Path) -> Result<()> {
        self.inner.discard(path)
    }

    fn build_mounts(&self, active: &ActiveSnapshot) -> Result<Vec<MountSpec>> {
        self.inner.build_mounts(active)
    }
}

/// Opens a snapshotter over `driver` wrapped in a fault injector.
fn open_faulty(driver: &str, fault: Fault) -> (tempfile::TempDir, Snapshotter) {
    let dir = tempfile::tempdir().expect("tempdir");
    let inner = registry()
        .open(&config(dir.path(), driver))
        .expect("driver");
    let store = MetaStore::open(inner.layout().root().join("metadata.json")).expect("store");
    let snapshotter = Snapshotter::new(store, Box::new(Faulty { inner, fault }));
    (dir, snapshotter)
}

// ── Round trip ───────────────────────────────────────────────────────

#[test]
fn prepare_commit_stat_round_trip() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();

        let base = commit_base(&snapshotter, "base");
        assert!(base.is_dir(), "{driver}: committed storage exists");

        let info = snapshotter.stat(&ctx, "base").expect("stat");
        assert_eq!(info.kind, Kind::Committed);
        assert!(info.readonly);
        assert!(info.parent.is_empty());
        let err = snapshotter.stat(&ctx, "base-work").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{driver}");

        let child = prepare_unit(&snapshotter, "child", "base");
        let info = snapshotter.stat(&ctx, "child").expect("stat");
        assert_eq!(info.kind, Kind::Active);
        assert_eq!(info.parent, "base");

        let mounts = snapshotter.mounts(&ctx, "child").expect("mounts");
        assert_eq!(mounts.len(), 1);
        if driver == "overlay" {
            let lower = mounts[0].option_value("lowerdir").expect("lowerdir");
            assert!(Path::new(lower).join("hello").is_file());
        } else {
            let content = std::fs::read_to_string(child.join("hello")).expect("read");
            assert_eq!(content, "hi", "{driver}: parent content visible");
        }

        assert_eq!(
            names(&snapshotter),
            vec![
                ("base".to_owned(), Kind::Committed),
                ("child".to_owned(), Kind::Active)
            ]
        );
    }
}

#[test]
fn prepare_with_existing_key_fails() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let _ = snapshotter.prepare(&ctx, "a", "").expect("prepare");
        let err = snapshotter.prepare(&ctx, "a", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{driver}");
        assert_eq!(units(snapshotter.root(), "active").len(), 1);
        assert_eq!(entries(snapshotter.root(), "active"), 1);
    }
}

#[test]
fn prepare_on_missing_parent_fails_without_residue() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let err = snapshotter.prepare(&ctx, "a", "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{driver}");
        assert_eq!(entries(snapshotter.root(), "active"), 0);
        assert!(names(&snapshotter).is_empty());
    }
}

#[test]
fn commit_to_existing_name_fails() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let _ = commit_base(&snapshotter, "base");
        let _ = snapshotter.prepare(&ctx, "b", "").expect("prepare");
        let err = snapshotter.commit(&ctx, "base", "b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{driver}");
        assert_eq!(
            snapshotter.stat(&ctx, "b").expect("stat").kind,
            Kind::Active
        );
    }
}

#[test]
fn metadata_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), "naive");
    {
        let snapshotter = Snapshotter::open(&config, &registry()).expect("open");
        let _ = commit_base(&snapshotter, "base");
        let _ = prepare_unit(&snapshotter, "child", "base");
    }
    let snapshotter = Snapshotter::open(&config, &registry()).expect("reopen");
    assert_eq!(names(&snapshotter).len(), 2);
    let mounts = snapshotter
        .mounts(&Context::background(), "child")
        .expect("mounts");
    assert_eq!(mounts[0].fs_type, "bind");
}

// ── Parent immutability ──────────────────────────────────────────────

#[test]
fn changes_in_child_never_reach_parent() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let base = commit_base(&snapshotter, "base");
        let child = prepare_unit(&snapshotter, "child", "base");

        let child_data = data_dir(&snapshotter, &child);
        std::fs::write(child_data.join("hello"), "changed").expect("write");
        std::fs::write(child_data.join("extra"), "x").expect("write");

        let base_data = data_dir(&snapshotter, &base);
        assert_eq!(
            std::fs::read_to_string(base_data.join("hello")).expect("read"),
            "hi",
            "{driver}"
        );
        assert!(!base_data.join("extra").exists(), "{driver}");
    }
}

// ── No dangling children ─────────────────────────────────────────────

#[test]
fn parent_with_children_is_in_use() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let base = commit_base(&snapshotter, "base");
        let _ = prepare_unit(&snapshotter, "child", "base");

        let err = snapshotter.remove(&ctx, "base").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InUse, "{driver}");
        assert!(base.is_dir());

        snapshotter.remove(&ctx, "child").expect("remove child");
        snapshotter.remove(&ctx, "base").expect("remove base");
        assert!(!base.exists());
        assert_eq!(entries(snapshotter.root(), "active"), 0, "{driver}");
        assert_eq!(entries(snapshotter.root(), "snapshots"), 0, "{driver}");
        assert!(names(&snapshotter).is_empty());
    }
}

#[test]
fn committed_child_keeps_parent_in_use() {
    let (_dir, snapshotter) = open("overlay");
    let ctx = Context::background();
    let _ = commit_base(&snapshotter, "base");
    let _ = snapshotter.prepare(&ctx, "work", "base").expect("prepare");
    snapshotter.commit(&ctx, "layer", "work").expect("commit");

    let err = snapshotter.remove(&ctx, "base").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InUse);
    snapshotter.remove(&ctx, "layer").expect("remove layer");
    snapshotter.remove(&ctx, "base").expect("remove base");
}

#[test]
fn remove_unknown_key_is_not_found() {
    let (_dir, snapshotter) = open("naive");
    let err = snapshotter
        .remove(&Context::background(), "ghost")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Readonly views ───────────────────────────────────────────────────

#[test]
fn views_are_readonly_and_cannot_be_committed() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let _ = commit_base(&snapshotter, "base");

        let mounts = snapshotter.view(&ctx, "v", "base").expect("view");
        assert_eq!(mounts.len(), 1);
        assert!(
            mounts[0].options.iter().any(|o| o == "ro"),
            "{driver}: view mounts readonly: {:?}",
            mounts[0]
        );
        assert!(snapshotter.stat(&ctx, "v").expect("stat").readonly);

        let err = snapshotter.commit(&ctx, "promoted", "v").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState, "{driver}");
        assert_eq!(
            snapshotter.stat(&ctx, "v").expect("stat").kind,
            Kind::Active
        );
        assert_eq!(
            snapshotter.stat(&ctx, "promoted").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        snapshotter.remove(&ctx, "v").expect("remove view");
    }
}

#[test]
fn overlay_view_of_single_parent_binds_parent_tree() {
    let (_dir, snapshotter) = open("overlay");
    let base = commit_base(&snapshotter, "base");
    let mounts = snapshotter
        .view(&Context::background(), "v", "base")
        .expect("view");
    assert_eq!(mounts[0].fs_type, "bind");
    assert_eq!(Path::new(&mounts[0].source), base.join("fs"));
    assert_eq!(mounts[0].options, vec!["ro", "rbind"]);
}

#[test]
fn btrfs_mounts_name_device_and_subvolume() {
    let (_dir, snapshotter) = open("btrfs-dir");
    let ctx = Context::background();
    let mounts = snapshotter.prepare(&ctx, "a", "").expect("prepare");
    assert_eq!(mounts[0].fs_type, "btrfs");
    assert_eq!(mounts[0].source, "/dev/vdb");
    assert!(mounts[0].option_value("subvolid").is_some());
    assert!(!mounts[0].options.iter().any(|o| o == "ro"));
}

// ── Key reuse ────────────────────────────────────────────────────────

#[test]
fn reused_key_gets_fresh_id() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let ctx = Context::background();
        let first = prepare_unit(&snapshotter, "k", "");
        snapshotter.remove(&ctx, "k").expect("remove");
        assert!(!first.exists());

        let second = prepare_unit(&snapshotter, "k", "");
        assert!(unit_id(&second) > unit_id(&first), "{driver}");
    }
}

#[test]
fn ids_are_not_reused_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), "overlay");
    let first = {
        let snapshotter = Snapshotter::open(&config, &registry()).expect("open");
        let unit = prepare_unit(&snapshotter, "k", "");
        snapshotter
            .remove(&Context::background(), "k")
            .expect("remove");
        unit
    };
    let snapshotter = Snapshotter::open(&config, &registry()).expect("reopen");
    let second = prepare_unit(&snapshotter, "k", "");
    assert!(unit_id(&second) > unit_id(&first));
}

// ── Overlay ordering ─────────────────────────────────────────────────

#[test]
fn overlay_lowerdirs_are_nearest_first() {
    let (_dir, snapshotter) = open("overlay");
    let ctx = Context::background();
    let mut layers = Vec::new();
    let mut parent = String::new();
    for name in ["l1", "l2", "l3"] {
        let unit = prepare_unit(&snapshotter, &format!("{name}-work"), &parent);
        snapshotter
            .commit(&ctx, name, &format!("{name}-work"))
            .expect("commit");
        layers.push(committed_unit(&snapshotter, &unit));
        parent = name.to_owned();
    }

    let top = prepare_unit(&snapshotter, "top", "l3");
    let mounts = snapshotter.mounts(&ctx, "top").expect("mounts");
    assert_eq!(mounts.len(), 1);
    let mount = &mounts[0];
    assert_eq!(mount.fs_type, "overlay");
    assert_eq!(mount.source, "overlay");

    let expected_lower = layers
        .iter()
        .rev()
        .map(|l| l.join("fs").to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":");
    assert_eq!(
        mount.options,
        vec![
            format!("workdir={}", top.join("work").display()),
            format!("upperdir={}", top.join("fs").display()),
            format!("lowerdir={expected_lower}"),
        ]
    );
}

#[test]
fn overlay_readonly_view_of_chain_has_no_upperdir() {
    let (_dir, snapshotter) = open("overlay");
    let ctx = Context::background();
    let _ = commit_base(&snapshotter, "base");
    let _ = snapshotter.prepare(&ctx, "w", "base").expect("prepare");
    snapshotter.commit(&ctx, "layer", "w").expect("commit");

    let mounts = snapshotter.view(&ctx, "v", "layer").expect("view");
    let mount = &mounts[0];
    assert_eq!(mount.fs_type, "overlay");
    assert!(mount.option_value("upperdir").is_none());
    assert!(mount.option_value("workdir").is_none());
    assert_eq!(
        mount
            .option_value("lowerdir")
            .expect("lowerdir")
            .split(':')
            .count(),
        2
    );
}

// ── Atomic promotion and compensation ────────────────────────────────

#[test]
fn cancelled_commit_keeps_exactly_the_active_snapshot() {
    for driver in DRIVERS {
        let cancel = Context::background();
        let (_dir, snapshotter) = open_faulty(driver, Fault::CancelAfterPromote(cancel.clone()));
        let unit = prepare_unit(&snapshotter, "a", "");
        std::fs::write(data_dir(&snapshotter, &unit).join("file"), "data").expect("write");

        let err = snapshotter.commit(&cancel, "base", "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{driver}");

        let ctx = Context::background();
        assert_eq!(
            snapshotter.stat(&ctx, "a").expect("stat").kind,
            Kind::Active,
            "{driver}"
        );
        assert_eq!(
            snapshotter.stat(&ctx, "base").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(data_dir(&snapshotter, &unit).join("file").is_file(), "{driver}");
        assert!(!committed_unit(&snapshotter, &unit).exists(), "{driver}");

        // The snapshot is still committable once the context is fresh.
        snapshotter.commit(&ctx, "base", "a").expect("commit");
        assert!(committed_unit(&snapshotter, &unit).is_dir());
        assert!(!unit.exists(), "{driver}");
    }
}

#[test]
fn failed_promotion_leaves_active_snapshot() {
    let (_dir, snapshotter) = open_faulty("naive", Fault::FailPromote);
    let ctx = Context::background();
    let unit = prepare_unit(&snapshotter, "a", "");
    let err = snapshotter.commit(&ctx, "base", "a").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert_eq!(
        snapshotter.stat(&ctx, "a").expect("stat").kind,
        Kind::Active
    );
    assert!(unit.is_dir());
}

#[test]
fn failed_storage_creation_records_nothing() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open_faulty(driver, Fault::FailCreate);
        let ctx = Context::background();
        let err = snapshotter.prepare(&ctx, "a", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure, "{driver}");
        assert_eq!(
            snapshotter.stat(&ctx, "a").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(entries(snapshotter.root(), "active"), 0);
    }
}

#[test]
fn cancelled_prepare_destroys_new_storage() {
    for driver in DRIVERS {
        let cancel = Context::background();
        let (_dir, snapshotter) = open_faulty(driver, Fault::CancelAfterCreate(cancel.clone()));
        let err = snapshotter.prepare(&cancel, "a", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{driver}");
        assert_eq!(entries(snapshotter.root(), "active"), 0, "{driver}");
        assert!(names(&snapshotter).is_empty());
    }
}

#[test]
fn cancelled_removal_restores_storage() {
    for driver in DRIVERS {
        let cancel = Context::background();
        let (_dir, snapshotter) = open_faulty(driver, Fault::CancelAfterMark(cancel.clone()));
        let base = commit_base(&snapshotter, "base");

        let err = snapshotter.remove(&cancel, "base").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{driver}");
        assert!(base.is_dir(), "{driver}");
        assert_eq!(entries(snapshotter.root(), "snapshots"), 1, "{driver}");
        assert_eq!(
            snapshotter
                .stat(&Context::background(), "base")
                .expect("stat")
                .kind,
            Kind::Committed
        );
    }
}

#[test]
fn cancelled_context_is_rejected_up_front() {
    let (_dir, snapshotter) = open("naive");
    let ctx = Context::background();
    ctx.cancel();
    assert_eq!(
        snapshotter.prepare(&ctx, "a", "").unwrap_err().kind(),
        ErrorKind::Cancelled
    );
    assert_eq!(
        snapshotter.stat(&ctx, "a").unwrap_err().kind(),
        ErrorKind::Cancelled
    );
    assert_eq!(entries(snapshotter.root(), "active"), 0);
}

// ── Sweep ────────────────────────────────────────────────────────────

#[test]
fn sweep_reclaims_leftovers_and_reports_orphans() {
    for driver in DRIVERS {
        let (_dir, snapshotter) = open(driver);
        let _ = commit_base(&snapshotter, "base");
        let root = snapshotter.root().to_path_buf();
        std::fs::create_dir_all(root.join("active").join("new-1234").join("fs")).expect("mkdir");
        std::fs::create_dir(root.join("snapshots").join("rm-99")).expect("mkdir");
        std::fs::create_dir(root.join("snapshots").join("77")).expect("mkdir");

        let report = snapshotter.sweep(&Context::background()).expect("sweep");
        assert_eq!(report.reclaimed.len(), 2, "{driver}");
        assert_eq!(report.orphans, vec![root.join("snapshots").join("77")]);
        assert!(!root.join("active").join("new-1234").exists());
        assert!(!root.join("snapshots").join("rm-99").exists());
        assert!(root.join("snapshots").join("77").exists());
        assert_eq!(units(&root, "snapshots").len(), 2);
    }
}

#[test]
fn open_sweeps_when_configured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), "naive");
    let root = config.root.clone();
    drop(Snapshotter::open(&config, &registry()).expect("open"));
    std::fs::create_dir(root.join("active").join("rm-3")).expect("mkdir");

    config.sweep_on_open = true;
    let _snapshotter = Snapshotter::open(&config, &registry()).expect("reopen");
    assert!(!root.join("active").join("rm-3").exists());
}

// ── Crash recovery ───────────────────────────────────────────────────
//
// Each test stops a snapshotter, rearranges its storage the way a crash at
// one step of an operation would leave it, and reopens.

fn reopen(root: &Path, driver: &str) -> Snapshotter {
    Snapshotter::open(&config(root, driver), &registry()).expect("reopen")
}

fn rename(from: &Path, to: &Path) {
    std::fs::rename(from, to).expect("rename");
}

#[test]
fn storage_left_by_crashed_prepare_is_reclaimed() {
    for driver in DRIVERS {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(dir.path(), driver);
        let root = config.root.clone();
        drop(Snapshotter::open(&config, &registry()).expect("open"));
        std::fs::create_dir_all(root.join("active/1/fs")).expect("mkdir");
        std::fs::create_dir_all(root.join("active/1/work")).expect("mkdir");
        std::fs::write(root.join("active/1/fs/stale"), "x").expect("write");

        config.sweep_on_open = true;
        let snapshotter = Snapshotter::open(&config, &registry()).expect("reopen");
        let ctx = Context::background();
        for key in ["a", "b", "c"] {
            let _ = snapshotter.prepare(&ctx, key, "").expect(driver);
        }
        assert_eq!(units(&root, "active").len(), 3, "{driver}");
        assert!(!root.join("active/1/fs/stale").exists(), "{driver}");
    }
}

#[test]
fn storage_on_disk_advances_id_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshotter = reopen(dir.path(), "naive");
    let root = snapshotter.root().to_path_buf();
    std::fs::create_dir(root.join("snapshots/77")).expect("mkdir");

    let report = snapshotter.sweep(&Context::background()).expect("sweep");
    assert_eq!(report.orphans, vec![root.join("snapshots/77")]);
    let unit = prepare_unit(&snapshotter, "a", "");
    assert!(unit_id(&unit) > 77, "{}", unit.display());
}

#[test]
fn unrecorded_active_storage_below_sequence_is_kept() {
    let (_dir, snapshotter) = open("naive");
    let ctx = Context::background();
    let unit = prepare_unit(&snapshotter, "a", "");
    snapshotter.remove(&ctx, "a").expect("remove");
    std::fs::create_dir(&unit).expect("mkdir");

    let report = snapshotter.sweep(&ctx).expect("sweep");
    assert_eq!(report.orphans, vec![unit.clone()]);
    assert!(report.reclaimed.is_empty());
    assert!(unit.exists());
}

#[test]
fn interrupted_rename_commit_is_reverted() {
    for driver in ["naive", "overlay"] {
        let dir = tempfile::tempdir().expect("tempdir");
        let unit = {
            let snapshotter = reopen(dir.path(), driver);
            let unit = prepare_unit(&snapshotter, "a", "");
            std::fs::write(data_dir(&snapshotter, &unit).join("hello"), "hi").expect("write");
            unit
        };
        let promoted = dir.path().join(driver).join("snapshots").join("1");
        rename(&unit, &promoted);

        let snapshotter = reopen(dir.path(), driver);
        let ctx = Context::background();
        let report = snapshotter.sweep(&ctx).expect("sweep");
        assert_eq!(report.recovered, vec![promoted.clone()], "{driver}");
        assert!(report.orphans.is_empty());
        assert!(unit.is_dir() && !promoted.exists());

        let _ = snapshotter.mounts(&ctx, "a").expect("mounts");
        snapshotter.commit(&ctx, "base", "a").expect("commit");
        assert_eq!(
            snapshotter.stat(&ctx, "base").expect("stat").kind,
            Kind::Committed
        );
        assert_eq!(
            std::fs::read_to_string(data_dir(&snapshotter, &promoted).join("hello"))
                .expect("read"),
            "hi"
        );
    }
}

#[test]
fn interrupted_btrfs_commit_drops_readonly_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unit = {
        let snapshotter = reopen(dir.path(), "btrfs-dir");
        prepare_unit(&snapshotter, "a", "")
    };
    let promoted = dir.path().join("btrfs-dir/snapshots/1");
    std::fs::create_dir(&promoted).expect("mkdir");
    strata_core::fsutil::copy_dir(&unit, &promoted).expect("copy");

    let snapshotter = reopen(dir.path(), "btrfs-dir");
    let ctx = Context::background();
    let report = snapshotter.sweep(&ctx).expect("sweep");
    assert_eq!(report.recovered, vec![promoted.clone()]);
    assert!(!promoted.exists() && unit.is_dir());
    assert_eq!(snapshotter.stat(&ctx, "a").expect("stat").kind, Kind::Active);

    snapshotter.commit(&ctx, "base", "a").expect("commit");
    assert!(promoted.is_dir() && !unit.exists());
}

#[test]
fn leftover_btrfs_active_volume_after_commit_is_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unit = {
        let snapshotter = reopen(dir.path(), "btrfs-dir");
        let unit = prepare_unit(&snapshotter, "a", "");
        snapshotter
            .commit(&Context::background(), "base", "a")
            .expect("commit");
        unit
    };
    std::fs::create_dir(&unit).expect("mkdir");

    let snapshotter = reopen(dir.path(), "btrfs-dir");
    let report = snapshotter.sweep(&Context::background()).expect("sweep");
    assert_eq!(report.recovered, vec![unit.clone()]);
    assert!(!unit.exists());
    assert_eq!(names(&snapshotter), vec![("base".to_owned(), Kind::Committed)]);
}

#[test]
fn interrupted_removal_restores_live_storage() {
    for driver in DRIVERS {
        let dir = tempfile::tempdir().expect("tempdir");
        let (base, work) = {
            let snapshotter = reopen(dir.path(), driver);
            let base = commit_base(&snapshotter, "base");
            (base, prepare_unit(&snapshotter, "work", "base"))
        };
        let area = |unit: &Path| unit.parent().expect("area").to_path_buf();
        let marked = |unit: &Path| area(unit).join(format!("rm-{}", unit_id(unit)));
        rename(&base, &marked(&base));
        rename(&work, &marked(&work));

        let snapshotter = reopen(dir.path(), driver);
        let ctx = Context::background();
        let report = snapshotter.sweep(&ctx).expect("sweep");
        assert_eq!(report.restored, vec![work.clone(), base.clone()], "{driver}");
        assert!(report.reclaimed.is_empty() && report.orphans.is_empty());
        assert!(!marked(&base).exists() && !marked(&work).exists());

        assert_eq!(snapshotter.stat(&ctx, "base").expect("stat").kind, Kind::Committed);
        assert!(data_dir(&snapshotter, &base).join("hello").is_file());
        let _ = snapshotter.mounts(&ctx, "work").expect("mounts");
    }
}

#[test]
fn removal_entry_of_deleted_record_is_reclaimed() {
    for driver in DRIVERS {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = {
            let snapshotter = reopen(dir.path(), driver);
            let base = commit_base(&snapshotter, "base");
            snapshotter
                .remove(&Context::background(), "base")
                .expect("remove");
            base
        };
        let marked = base
            .parent()
            .expect("area")
            .join(format!("rm-{}", unit_id(&base)));
        std::fs::create_dir(&marked).expect("mkdir");

        let snapshotter = reopen(dir.path(), driver);
        let report = snapshotter.sweep(&Context::background()).expect("sweep");
        assert_eq!(report.reclaimed, vec![marked.clone()], "{driver}");
        assert!(!marked.exists() && !base.exists());
    }
}

#[test]
fn second_snapshotter_on_same_root_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), "naive");
    let _first = Snapshotter::open(&config, &registry()).expect("open");
    let err = Snapshotter::open(&config, &registry()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

// ── Concurrency ──────────────────────────────────────────────────────

#[test]
fn concurrent_prepares_receive_distinct_ids() {
    let (_dir, snapshotter) = open("overlay");
    let snapshotter = Arc::new(snapshotter);
    let _ = commit_base(&snapshotter, "base");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let snapshotter = Arc::clone(&snapshotter);
            std::thread::spawn(move || {
                let ctx = Context::background();
                let _ = snapshotter
                    .prepare(&ctx, &format!("job-{i}"), "base")
                    .expect("prepare");
                snapshotter.stat(&ctx, "base").expect("stat").kind
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), Kind::Committed);
    }

    assert_eq!(units(snapshotter.root(), "active").len(), 8);
    assert_eq!(names(&snapshotter).len(), 9);
}

#[test]
fn naive_driver_is_plain_directory_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let driver = NaiveDriver::open(dir.path()).expect("driver");
    let store = MetaStore::open(dir.path().join("metadata.json")).expect("store");
    let snapshotter = Snapshotter::new(store, Box::new(driver));
    let base = commit_base(&snapshotter, "base");
    let child = prepare_unit(&snapshotter, "c", "base");
    assert_ne!(base, child);
    assert_eq!(
        std::fs::read_to_string(child.join("hello")).expect("read"),
        "hi"
    );
}

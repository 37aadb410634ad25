//! # strata-core
//!
//! Snapshot storage drivers for the Strata snapshotter.
//!
//! This crate provides:
//! - **Drivers**: the [`SnapshotDriver`](driver::SnapshotDriver) capability
//!   set with plain-copy, `OverlayFS`, and btrfs implementations.
//! - **Layout**: the `active/` and `snapshots/` areas, staging, and the
//!   rename-based two-phase removal shared by all drivers.
//! - **Volumes**: subvolume operations behind a trait, driven by the `btrfs`
//!   tool in production.
//! - **Probing**: overlay and btrfs capability checks.
//!
//! Drivers never touch the metadata store. They are unix-only.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod driver;
pub mod fsutil;
pub mod probe;
pub mod volume;

//! # strata-snapshotter
//!
//! Public façade of the Strata snapshot subsystem.
//!
//! A [`Snapshotter`] pairs one [`MetaStore`](strata_metadata::MetaStore) with
//! one storage driver. Every mutating operation runs inside a writable
//! metadata transaction and undoes its filesystem work when that transaction
//! fails to commit, so metadata and storage never drift apart.
//!
//! Drivers are looked up by name in a [`DriverRegistry`] that the caller
//! builds explicitly.
//!
//! ```rust,no_run
//! use strata_common::config::SnapshotterConfig;
//! use strata_common::context::Context;
//! use strata_snapshotter::{DriverRegistry, Snapshotter};
//!
//! # fn main() -> strata_common::error::Result<()> {
//! let config = SnapshotterConfig::new("/var/lib/strata/naive", "naive");
//! let snapshotter = Snapshotter::open(&config, &DriverRegistry::builtin())?;
//! let ctx = Context::background();
//!
//! let mounts = snapshotter.prepare(&ctx, "build-1", "")?;
//! for mount in &mounts {
//!     println!("{mount}");
//! }
//! snapshotter.commit(&ctx, "base", "build-1")?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod registry;
pub mod snapshotter;

pub use registry::{DriverFactory, DriverRegistry};
pub use snapshotter::{Snapshotter, SweepReport};

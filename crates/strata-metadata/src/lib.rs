//! # strata-metadata
//!
//! Transactional metadata store for snapshot records.
//!
//! The store tracks active and committed snapshots, their storage IDs,
//! parent chains, and labels. It never touches snapshot storage on disk;
//! keeping the filesystem in step is the snapshotter's job.
//!
//! ```rust,no_run
//! use strata_common::context::Context;
//! use strata_common::types::Labels;
//! use strata_metadata::MetaStore;
//!
//! # fn main() -> strata_common::error::Result<()> {
//! let store = MetaStore::open("/var/lib/strata/overlay/metadata.json")?;
//! let ctx = Context::background();
//! let mut tx = store.begin(&ctx, true)?;
//! let active = tx.create_active("build-1", "", false, Labels::new())?;
//! tx.commit()?;
//! println!("allocated {}", active.id);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod schema;
pub mod store;
pub mod transaction;

pub use store::MetaStore;
pub use transaction::Transaction;

//! # strata-common
//!
//! Shared snapshot types, error definitions, configuration models, context,
//! and constants used across the entire Strata workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the metadata store, the
//! storage drivers, and the snapshotter façade build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod types;

//! `strata mounts` — Print the mounts of an active snapshot.

use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `mounts` command.
#[derive(Args, Debug)]
pub struct MountsArgs {
    /// Key of the active snapshot.
    pub key: String,
}

/// Executes the `mounts` command.
///
/// # Errors
///
/// Returns an error if `key` is not an active snapshot.
pub fn execute(args: &MountsArgs, session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let mounts = snapshotter.mounts(&session.context()?, &args.key)?;
    output::print_mounts(&mounts, session.json())
}

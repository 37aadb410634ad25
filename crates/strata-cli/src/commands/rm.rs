//! `strata rm` — Remove snapshots.

use clap::Args;

use super::Session;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Keys or names to remove, children before parents.
    #[arg(required = true)]
    pub keys: Vec<String>,
}

/// Executes the `rm` command.
///
/// Stops at the first snapshot that cannot be removed.
///
/// # Errors
///
/// Returns an error if a snapshot is missing or still has children.
pub fn execute(args: &RmArgs, session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let ctx = session.context()?;
    for key in &args.keys {
        snapshotter.remove(&ctx, key)?;
        if !session.json() {
            println!("{key}");
        }
    }
    Ok(())
}

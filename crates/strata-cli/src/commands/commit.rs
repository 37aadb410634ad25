//! `strata commit` — Commit an active snapshot.

use clap::Args;

use super::Session;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Name of the committed snapshot.
    pub name: String,

    /// Key of the active snapshot to commit.
    pub key: String,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be committed.
pub fn execute(args: &CommitArgs, session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    snapshotter.commit(&session.context()?, &args.name, &args.key)?;
    if !session.json() {
        println!("{}", args.name);
    }
    Ok(())
}

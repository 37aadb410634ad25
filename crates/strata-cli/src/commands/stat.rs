//! `strata stat` — Show a snapshot.

use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `stat` command.
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Active key or committed name.
    pub key: String,
}

/// Executes the `stat` command.
///
/// # Errors
///
/// Returns an error if the snapshot does not exist.
pub fn execute(args: &StatArgs, session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let info = snapshotter.stat(&session.context()?, &args.key)?;

    if session.json() {
        return output::print_json(&info);
    }
    println!("Name:     {}", info.name);
    println!("Kind:     {}", info.kind);
    println!("Parent:   {}", output::or_dash(&info.parent));
    println!("Readonly: {}", info.readonly);
    println!("Created:  {}", output::format_time(&info.created));
    println!("Updated:  {}", output::format_time(&info.updated));
    println!("Labels:   {}", output::format_labels(&info.labels));
    Ok(())
}

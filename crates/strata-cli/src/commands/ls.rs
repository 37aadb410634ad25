//! `strata ls` — List all snapshots.

use strata_common::types::Info;

use super::Session;
use crate::output;

/// Executes the `ls` command.
///
/// Committed snapshots are listed before active ones.
///
/// # Errors
///
/// Returns an error if the metadata store cannot be read.
pub fn execute(session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let mut infos: Vec<Info> = Vec::new();
    snapshotter.walk(&session.context()?, |info| {
        infos.push(info.clone());
        Ok(())
    })?;

    if session.json() {
        return output::print_json(&infos);
    }
    if infos.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<24} {:<3} {:<20} LABELS",
        "NAME", "KIND", "PARENT", "RO", "CREATED"
    );
    for info in &infos {
        println!(
            "{:<24} {:<10} {:<24} {:<3} {:<20} {}",
            info.name,
            info.kind,
            output::or_dash(&info.parent),
            if info.readonly { "yes" } else { "no" },
            output::format_time(&info.created),
            output::format_labels(&info.labels)
        );
    }
    Ok(())
}

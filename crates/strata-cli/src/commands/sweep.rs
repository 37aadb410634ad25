//! `strata sweep` — Repair storage left by interrupted operations.

use super::Session;
use crate::output;

/// Executes the `sweep` command.
///
/// # Errors
///
/// Returns an error if the storage areas cannot be scanned.
pub fn execute(session: &Session) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let report = snapshotter.sweep(&session.context()?)?;

    if session.json() {
        return output::print_json(&report);
    }
    println!("Reclaimed {} leftover entries.", report.reclaimed.len());
    print_paths(&report.reclaimed);
    if !report.restored.is_empty() {
        println!("Restored {} snapshots from interrupted removals:", report.restored.len());
        print_paths(&report.restored);
    }
    if !report.recovered.is_empty() {
        println!("Recovered {} interrupted commits:", report.recovered.len());
        print_paths(&report.recovered);
    }
    if !report.orphans.is_empty() {
        println!("Found {} storage units with no record:", report.orphans.len());
        print_paths(&report.orphans);
    }
    Ok(())
}

fn print_paths(paths: &[std::path::PathBuf]) {
    for path in paths {
        println!("  {}", path.display());
    }
}

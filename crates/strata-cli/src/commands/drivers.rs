//! `strata drivers` — List the available storage drivers.

use super::Session;
use crate::output;

/// Executes the `drivers` command.
///
/// The configured driver is marked with `*`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(session: &Session) -> anyhow::Result<()> {
    let names = session.registry().names();
    if session.json() {
        return output::print_json(&names);
    }
    for name in names {
        let marker = if name == session.config().driver { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

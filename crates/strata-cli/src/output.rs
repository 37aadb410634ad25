//! Formatted output helpers for CLI commands.
//!
//! Every command prints either an aligned text table or, with `--json`,
//! pretty-printed JSON on stdout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_common::types::{Labels, MountSpec};

/// Prints `value` as pretty JSON.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints mount specifications, one per line, in mount order.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_mounts(mounts: &[MountSpec], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(mounts);
    }
    println!("{:<8} {:<40} OPTIONS", "TYPE", "SOURCE");
    for mount in mounts {
        println!(
            "{:<8} {:<40} {}",
            mount.fs_type,
            mount.source,
            mount.options.join(",")
        );
    }
    Ok(())
}

/// Formats a timestamp to the second, in UTC.
#[must_use]
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Formats labels as `k=v,k=v`, or `-` when empty.
#[must_use]
pub fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return "-".into();
    }
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Returns `value`, or `-` when it is empty.
#[must_use]
pub fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

//! `strata prepare` and `strata view` — Create active snapshots.

use clap::Args;
use strata_common::types::Labels;

use super::Session;
use crate::output;

/// Arguments shared by the `prepare` and `view` commands.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Key of the new active snapshot.
    pub key: String,

    /// Committed parent. Omit for a base layer.
    #[arg(default_value = "")]
    pub parent: String,

    /// Label to attach, as `key=value`. May be repeated.
    #[arg(short, long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

/// Executes `prepare`, or `view` when `readonly` is set.
///
/// # Errors
///
/// Returns an error if the key exists, the parent is missing, or storage
/// cannot be created.
pub fn execute(args: PrepareArgs, session: &Session, readonly: bool) -> anyhow::Result<()> {
    let snapshotter = session.snapshotter()?;
    let ctx = session.context()?;
    let labels: Labels = args.labels.into_iter().collect();

    let mounts = if readonly {
        snapshotter.view_with_labels(&ctx, &args.key, &args.parent, labels)?
    } else {
        snapshotter.prepare_with_labels(&ctx, &args.key, &args.parent, labels)?
    };
    tracing::debug!(key = %args.key, mounts = mounts.len(), "snapshot ready");
    output::print_mounts(&mounts, session.json())
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

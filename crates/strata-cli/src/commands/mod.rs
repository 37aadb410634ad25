//! CLI command definitions and dispatch.

pub mod commit;
pub mod drivers;
pub mod ls;
pub mod mounts;
pub mod prepare;
pub mod rm;
pub mod stat;
pub mod sweep;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use strata_common::config::SnapshotterConfig;
use strata_common::context::Context;
use strata_snapshotter::{DriverRegistry, Snapshotter};

/// Strata — copy-on-write snapshot storage for container root filesystems.
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a JSON configuration file.
    #[arg(long, global = true, env = strata_common::constants::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Snapshot root, overriding the configuration file.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Storage driver, overriding the configuration file.
    #[arg(long, global = true)]
    pub driver: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a snapshot.
    Stat(stat::StatArgs),
    /// Create a writable snapshot and print its mounts.
    Prepare(prepare::PrepareArgs),
    /// Create a readonly view of a committed snapshot and print its mounts.
    View(prepare::PrepareArgs),
    /// Print the mounts of an active snapshot.
    Mounts(mounts::MountsArgs),
    /// Commit an active snapshot under a name.
    Commit(commit::CommitArgs),
    /// Remove snapshots.
    Rm(rm::RmArgs),
    /// List all snapshots.
    Ls,
    /// Repair storage left by interrupted operations.
    Sweep,
    /// List the available storage drivers.
    Drivers,
}

/// Resolved configuration shared by every command.
#[derive(Debug)]
pub struct Session {
    config: SnapshotterConfig,
    registry: DriverRegistry,
    json: bool,
}

impl Session {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => SnapshotterConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => SnapshotterConfig::default(),
        };
        if let Some(driver) = &cli.driver {
            config.driver.clone_from(driver);
            if cli.root.is_none() && cli.config.is_none() {
                config.root = strata_common::constants::root_dir().join(driver);
            }
        }
        if let Some(root) = &cli.root {
            config.root.clone_from(root);
        }
        config.validate()?;
        Ok(Self {
            config,
            registry: DriverRegistry::builtin(),
            json: cli.json,
        })
    }

    /// Opens the configured snapshotter.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver or the metadata store cannot be opened.
    pub fn snapshotter(&self) -> anyhow::Result<Snapshotter> {
        Snapshotter::open(&self.config, &self.registry).with_context(|| {
            format!(
                "failed to open {} snapshotter at {}",
                self.config.driver,
                self.config.root.display()
            )
        })
    }

    /// Returns a context cancelled by Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler cannot be installed.
    pub fn context(&self) -> anyhow::Result<Context> {
        let ctx = Context::background();
        let handle = ctx.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupted, cancelling operation");
            handle.cancel();
        })
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;
        Ok(ctx)
    }

    /// Returns whether output is JSON.
    #[must_use]
    pub const fn json(&self) -> bool {
        self.json
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &SnapshotterConfig {
        &self.config
    }

    /// Returns the driver registry.
    #[must_use]
    pub const fn registry(&self) -> &DriverRegistry {
        &self.registry
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let session = Session::from_cli(&cli)?;
    match cli.command {
        Command::Stat(args) => stat::execute(&args, &session),
        Command::Prepare(args) => prepare::execute(args, &session, false),
        Command::View(args) => prepare::execute(args, &session, true),
        Command::Mounts(args) => mounts::execute(&args, &session),
        Command::Commit(args) => commit::execute(&args, &session),
        Command::Rm(args) => rm::execute(&args, &session),
        Command::Ls => ls::execute(&session),
        Command::Sweep => sweep::execute(&session),
        Command::Drivers => drivers::execute(&session),
    }
}

//! Name-to-factory table of storage drivers.
//!
//! The registry is a plain value owned by the caller. Nothing registers
//! itself at load time; [`DriverRegistry::builtin`] lists the drivers shipped
//! with this workspace and callers may add their own.

use std::collections::BTreeMap;
use std::fmt;

use strata_common::config::SnapshotterConfig;
use strata_common::error::{Result, SnapshotError};
use strata_core::driver::SnapshotDriver;
use strata_core::driver::btrfs::BtrfsDriver;
use strata_core::driver::naive::NaiveDriver;
use strata_core::driver::overlay::OverlayDriver;

/// Constructs a driver from a snapshotter configuration.
pub type DriverFactory =
    Box<dyn Fn(&SnapshotterConfig) -> Result<Box<dyn SnapshotDriver>> + Send + Sync>;

/// Drivers available to [`Snapshotter::open`](crate::Snapshotter::open).
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the `naive`, `overlay`, and `btrfs` drivers.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(NaiveDriver::NAME, |config: &SnapshotterConfig| {
            Ok(Box::new(NaiveDriver::open(&config.root)?) as Box<dyn SnapshotDriver>)
        });
        registry.insert(OverlayDriver::NAME, |config: &SnapshotterConfig| {
            Ok(Box::new(OverlayDriver::open(&config.root)?) as Box<dyn SnapshotDriver>)
        });
        registry.insert(BtrfsDriver::NAME, |config: &SnapshotterConfig| {
            let driver = BtrfsDriver::open(&config.root, config.btrfs.device.as_deref())?;
            Ok(Box::new(driver) as Box<dyn SnapshotDriver>)
        });
        registry
    }

    /// Registers a driver factory under `name`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::AlreadyExists` if `name` is taken.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&SnapshotterConfig) -> Result<Box<dyn SnapshotDriver>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(SnapshotError::AlreadyExists {
                what: "driver",
                key: name,
            });
        }
        self.insert(name, factory);
        Ok(())
    }

    /// Returns the registered driver names in ascending order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Returns whether a driver is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the driver named by `config.driver`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Config` if the configuration is invalid or
    /// names an unknown driver, or the factory's own error.
    pub fn open(&self, config: &SnapshotterConfig) -> Result<Box<dyn SnapshotDriver>> {
        config.validate()?;
        let Some(factory) = self.factories.get(&config.driver) else {
            return Err(SnapshotError::Config {
                message: format!(
                    "unknown driver '{}' (available: {})",
                    config.driver,
                    self.names().join(", ")
                ),
            });
        };
        let driver = factory(config)?;
        tracing::info!(
            driver = %config.driver,
            root = %config.root.display(),
            "storage driver opened"
        );
        Ok(driver)
    }

    fn insert<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SnapshotterConfig) -> Result<Box<dyn SnapshotDriver>> + Send + Sync + 'static,
    {
        let _ = self.factories.insert(name.into(), Box::new(factory));
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

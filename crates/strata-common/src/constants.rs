//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default root directory for snapshot data on Linux with root access.
pub const SYSTEM_ROOT_DIR: &str = "/var/lib/strata";

/// Returns the snapshot root, preferring `$HOME/.strata` for non-root
/// environments, falling back to `/var/lib/strata`.
fn resolve_root_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let user_dir = PathBuf::from(home).join(".strata");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_ROOT_DIR)
}

static ROOT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved default snapshot root for this session.
pub fn root_dir() -> &'static PathBuf {
    ROOT_DIR.get_or_init(resolve_root_dir)
}

/// File name of the persisted metadata store inside a driver root.
pub const METADATA_FILE: &str = "metadata.json";

/// Directory holding active snapshot storage inside a driver root.
pub const ACTIVE_DIR: &str = "active";

/// Directory holding committed snapshot storage inside a driver root.
pub const COMMITTED_DIR: &str = "snapshots";

/// Prefix of storage units renamed aside for removal.
pub const REMOVAL_PREFIX: &str = "rm-";

/// Prefix of storage units being staged before they receive their ID.
pub const STAGING_PREFIX: &str = "new-";

/// Current version of the persisted metadata schema.
pub const METADATA_VERSION: u32 = 1;

/// Driver used when the configuration does not name one.
pub const DEFAULT_DRIVER: &str = "overlay";

/// Application name used in CLI output.
pub const APP_NAME: &str = "strata";

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV: &str = "STRATA_CONFIG";

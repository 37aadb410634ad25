//! Domain primitive types used across the Strata workspace.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage-internal identifier of a snapshot.
///
/// Assigned once by the metadata store and never reused. It names the
/// on-disk storage unit, decoupling the layout from caller-chosen keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Creates a snapshot ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the ID for a value of the store's sequence.
    #[must_use]
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a snapshot is an in-progress working tree or an immutable layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Mutable (or readonly view) snapshot identified by a key.
    Active,
    /// Immutable snapshot identified by a name.
    Committed,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

/// Free-form labels attached to a snapshot.
pub type Labels = BTreeMap<String, String>;

/// Externally visible description of a snapshot of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Active key or committed name.
    pub name: String,
    /// Name of the committed parent, empty for a base layer.
    pub parent: String,
    /// Kind of the snapshot.
    pub kind: Kind,
    /// Whether the snapshot is a readonly view. Always true for committed ones.
    pub readonly: bool,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Time of the last metadata change.
    pub updated: DateTime<Utc>,
    /// Attached labels.
    pub labels: Labels,
}

/// Internal state of an active snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSnapshot {
    /// Storage identifier.
    pub id: SnapshotId,
    /// Committed ancestors, nearest parent first.
    pub parent_ids: Vec<SnapshotId>,
    /// Whether this is a readonly view.
    pub readonly: bool,
    /// Caller-chosen key.
    pub key: String,
}

/// A single mount descriptor handed to the host's mount facility.
///
/// Option order is significant and must be preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Filesystem type, e.g. `bind`, `overlay`, `btrfs`.
    #[serde(rename = "type")]
    pub fs_type: String,
    /// Mount source.
    pub source: String,
    /// Ordered filesystem-specific options.
    pub options: Vec<String>,
}

impl MountSpec {
    /// Creates a recursive bind mount of `source`.
    #[must_use]
    pub fn bind(source: impl Into<String>, readonly: bool) -> Self {
        let flag = if readonly { "ro" } else { "rw" };
        Self {
            fs_type: "bind".into(),
            source: source.into(),
            options: vec![flag.into(), "rbind".into()],
        }
    }

    /// Returns the value of a `name=value` option, if present.
    #[must_use]
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options.iter().find_map(|opt| {
            opt.split_once('=')
                .filter(|(k, _)| *k == name)
                .map(|(_, v)| v)
        })
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.fs_type,
            self.source,
            self.options.join(",")
        )
    }
}

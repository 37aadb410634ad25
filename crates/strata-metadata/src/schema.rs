//! Persisted layout of the metadata file.
//!
//! The whole record set is one JSON document. Maps are ordered so that the
//! file is stable across writes and walks visit records in name order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_common::constants::METADATA_VERSION;
use strata_common::types::{ActiveSnapshot, Info, Kind, Labels, SnapshotId};

/// Complete persisted state of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    /// Schema version of the document.
    pub version: u32,
    /// Next value of the ID sequence. Only ever increases.
    pub next_id: u64,
    /// Active records by key.
    #[serde(default)]
    pub active: BTreeMap<String, ActiveRow>,
    /// Committed records by name.
    #[serde(default)]
    pub committed: BTreeMap<String, CommittedRow>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            next_id: 1,
            active: BTreeMap::new(),
            committed: BTreeMap::new(),
        }
    }
}

impl StoreState {
    /// Takes the next value of the ID sequence.
    pub fn allocate_id(&mut self) -> SnapshotId {
        let id = SnapshotId::from_sequence(self.next_id);
        self.next_id += 1;
        id
    }

    /// Number of records whose nearest parent is `id`.
    pub fn dependents_of(&self, id: &SnapshotId) -> usize {
        let active = self
            .active
            .values()
            .filter(|row| row.parent_ids.first() == Some(id))
            .count();
        let committed = self
            .committed
            .values()
            .filter(|row| row.parent_ids.first() == Some(id))
            .count();
        active + committed
    }
}

/// Row of an active snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ActiveRow {
    pub id: SnapshotId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default)]
    pub parent_ids: Vec<SnapshotId>,
    #[serde(default)]
    pub readonly: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl ActiveRow {
    pub fn to_active(&self, key: &str) -> ActiveSnapshot {
        ActiveSnapshot {
            id: self.id.clone(),
            parent_ids: self.parent_ids.clone(),
            readonly: self.readonly,
            key: key.to_owned(),
        }
    }

    pub fn to_info(&self, key: &str) -> Info {
        Info {
            name: key.to_owned(),
            parent: self.parent.clone(),
            kind: Kind::Active,
            readonly: self.readonly,
            created: self.created,
            updated: self.updated,
            labels: self.labels.clone(),
        }
    }
}

/// Row of a committed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommittedRow {
    pub id: SnapshotId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default)]
    pub parent_ids: Vec<SnapshotId>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl CommittedRow {
    pub fn to_info(&self, name: &str) -> Info {
        Info {
            name: name.to_owned(),
            parent: self.parent.clone(),
            kind: Kind::Committed,
            readonly: true,
            created: self.created,
            updated: self.updated,
            labels: self.labels.clone(),
        }
    }
}

//! Transactions over the snapshot record set.
//!
//! A transaction must be resolved exactly once with [`Transaction::commit`]
//! or [`Transaction::rollback`]. Dropping an unresolved transaction rolls it
//! back.

use std::collections::BTreeSet;
use std::sync::{Arc, MutexGuard};

use chrono::Utc;
use strata_common::context::Context;
use strata_common::error::{Result, SnapshotError};
use strata_common::types::{ActiveSnapshot, Info, Kind, Labels, SnapshotId};

use crate::schema::{ActiveRow, CommittedRow, StoreState};
use crate::store::MetaStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Open,
    Committed,
    RolledBack,
}

/// A readonly or writable transaction on a [`MetaStore`].
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a MetaStore,
    ctx: Context,
    state: Arc<StoreState>,
    writer: Option<MutexGuard<'a, ()>>,
    dirty: bool,
    status: Status,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        store: &'a MetaStore,
        ctx: Context,
        state: Arc<StoreState>,
        writer: Option<MutexGuard<'a, ()>>,
    ) -> Self {
        Self {
            store,
            ctx,
            state,
            writer,
            dirty: false,
            status: Status::Open,
        }
    }

    /// Returns whether this transaction may mutate the store.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    /// Resolves `key` against active records first, then committed ones.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` names neither.
    pub fn get_info(&self, key: &str) -> Result<Info> {
        self.ensure_open()?;
        if let Some(row) = self.state.active.get(key) {
            return Ok(row.to_info(key));
        }
        if let Some(row) = self.state.committed.get(key) {
            return Ok(row.to_info(key));
        }
        Err(not_found("snapshot", key))
    }

    /// Returns the active record for `key`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if no active record has this key.
    pub fn get_active(&self, key: &str) -> Result<ActiveSnapshot> {
        self.ensure_open()?;
        self.state
            .active
            .get(key)
            .map(|row| row.to_active(key))
            .ok_or_else(|| not_found("active snapshot", key))
    }

    /// Creates an active record for `key` on top of the committed `parent`.
    ///
    /// An empty `parent` creates a base layer. The new record receives a
    /// fresh ID and the parent chain `[parent] ++ parent's chain`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::AlreadyExists` if `key` is already active,
    /// `SnapshotError::NotFound` if `parent` is not a committed snapshot, or
    /// `SnapshotError::InvalidState` if the key is empty or the transaction
    /// is readonly.
    pub fn create_active(
        &mut self,
        key: &str,
        parent: &str,
        readonly: bool,
        labels: Labels,
    ) -> Result<ActiveSnapshot> {
        self.ensure_writable()?;
        if key.is_empty() {
            return Err(invalid("snapshot key must not be empty"));
        }
        if self.state.active.contains_key(key) {
            return Err(SnapshotError::AlreadyExists {
                what: "active snapshot",
                key: key.to_owned(),
            });
        }

        let parent_ids = if parent.is_empty() {
            Vec::new()
        } else {
            let row = self
                .state
                .committed
                .get(parent)
                .ok_or_else(|| not_found("parent snapshot", parent))?;
            std::iter::once(row.id.clone())
                .chain(row.parent_ids.iter().cloned())
                .collect()
        };

        let now = Utc::now();
        let state = self.state_mut();
        let id = state.allocate_id();
        let row = ActiveRow {
            id,
            parent: parent.to_owned(),
            parent_ids,
            readonly,
            created: now,
            updated: now,
            labels,
        };
        let active = row.to_active(key);
        let _ = state.active.insert(key.to_owned(), row);

        tracing::debug!(key, parent, id = %active.id, readonly, "active record created");
        Ok(active)
    }

    /// Replaces the active record `key` with a committed record `name`.
    ///
    /// The committed record keeps the ID, parent chain, and labels.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` is not active,
    /// `SnapshotError::AlreadyExists` if `name` is already committed, or
    /// `SnapshotError::InvalidState` if the active record is a readonly view.
    pub fn commit_active(&mut self, key: &str, name: &str) -> Result<SnapshotId> {
        self.ensure_writable()?;
        if name.is_empty() {
            return Err(invalid("snapshot name must not be empty"));
        }
        let row = self
            .state
            .active
            .get(key)
            .ok_or_else(|| not_found("active snapshot", key))?;
        if self.state.committed.contains_key(name) {
            return Err(SnapshotError::AlreadyExists {
                what: "committed snapshot",
                key: name.to_owned(),
            });
        }
        if row.readonly {
            return Err(invalid(format!(
                "snapshot {key} is a readonly view and cannot be committed"
            )));
        }

        let state = self.state_mut();
        let Some(row) = state.active.remove(key) else {
            return Err(not_found("active snapshot", key));
        };
        let id = row.id.clone();
        let committed = CommittedRow {
            id: row.id,
            parent: row.parent,
            parent_ids: row.parent_ids,
            created: row.created,
            updated: Utc::now(),
            labels: row.labels,
        };
        let _ = state.committed.insert(name.to_owned(), committed);

        tracing::debug!(key, name, id = %id, "active record committed");
        Ok(id)
    }

    /// Removes the record `key`, active records first.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::NotFound` if `key` names neither kind, or
    /// `SnapshotError::InUse` if a committed record is still a parent.
    pub fn remove(&mut self, key: &str) -> Result<(SnapshotId, Kind)> {
        self.ensure_writable()?;
        if self.state.active.contains_key(key) {
            let state = self.state_mut();
            let Some(row) = state.active.remove(key) else {
                return Err(not_found("snapshot", key));
            };
            tracing::debug!(key, id = %row.id, "active record removed");
            return Ok((row.id, Kind::Active));
        }

        let row = self
            .state
            .committed
            .get(key)
            .ok_or_else(|| not_found("snapshot", key))?;
        let dependents = self.state.dependents_of(&row.id);
        if dependents > 0 {
            return Err(SnapshotError::InUse {
                name: key.to_owned(),
                dependents,
            });
        }

        let state = self.state_mut();
        let Some(row) = state.committed.remove(key) else {
            return Err(not_found("snapshot", key));
        };
        tracing::debug!(key, id = %row.id, "committed record removed");
        Ok((row.id, Kind::Committed))
    }

    /// Visits every committed record, then every active record, each in
    /// ascending name order. An error from `visit` stops the walk.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`.
    pub fn walk_info<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&Info) -> Result<()>,
    {
        self.ensure_open()?;
        for (name, row) in &self.state.committed {
            visit(&row.to_info(name))?;
        }
        for (key, row) in &self.state.active {
            visit(&row.to_info(key))?;
        }
        Ok(())
    }

    /// Returns the IDs of all records of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidState` if the transaction is resolved.
    pub fn ids(&self, kind: Kind) -> Result<BTreeSet<SnapshotId>> {
        self.ensure_open()?;
        let ids = match kind {
            Kind::Active => self.state.active.values().map(|r| r.id.clone()).collect(),
            Kind::Committed => self
                .state
                .committed
                .values()
                .map(|r| r.id.clone())
                .collect(),
        };
        Ok(ids)
    }

    /// Returns the next value of the ID sequence.
    ///
    /// Any storage unit named by an ID at or above this value was created by
    /// an operation that never committed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidState` if the transaction is resolved.
    pub fn next_id(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.state.next_id)
    }

    /// Advances the ID sequence past `last` so it is never allocated.
    ///
    /// Returns whether the sequence moved.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidState` if the transaction is readonly
    /// or resolved.
    pub fn reserve_ids_through(&mut self, last: u64) -> Result<bool> {
        self.ensure_writable()?;
        if last < self.state.next_id {
            return Ok(false);
        }
        let next = last.saturating_add(1);
        self.state_mut().next_id = next;
        tracing::debug!(next, "ID sequence advanced past existing storage");
        Ok(true)
    }

    /// Persists the changes made in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidState` if the transaction is readonly
    /// or already resolved, `SnapshotError::Cancelled` if the context was
    /// cancelled (the transaction is rolled back), or
    /// `SnapshotError::StoreUnavailable` if persisting fails (the transaction
    /// is rolled back).
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.is_writable() {
            return Err(invalid("cannot commit a readonly transaction"));
        }
        if let Err(err) = self.ctx.check() {
            self.finish(Status::RolledBack);
            return Err(err);
        }
        if self.dirty {
            if let Err(err) = self.store.publish(Arc::clone(&self.state)) {
                self.finish(Status::RolledBack);
                return Err(err);
            }
        }
        self.finish(Status::Committed);
        Ok(())
    }

    /// Discards the changes made in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidState` if the transaction is already
    /// resolved.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finish(Status::RolledBack);
        Ok(())
    }

    fn finish(&mut self, status: Status) {
        self.status = status;
        self.writer = None;
        tracing::trace!(?status, "transaction finished");
    }

    fn state_mut(&mut self) -> &mut StoreState {
        self.dirty = true;
        Arc::make_mut(&mut self.state)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            Status::Open => Ok(()),
            Status::Committed => Err(invalid("transaction already committed")),
            Status::RolledBack => Err(invalid("transaction already rolled back")),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.is_writable() {
            Ok(())
        } else {
            Err(invalid("transaction is readonly"))
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.status == Status::Open && self.dirty {
            tracing::debug!("unresolved transaction rolled back on drop");
        }
    }
}

fn not_found(what: &'static str, key: &str) -> SnapshotError {
    SnapshotError::NotFound {
        what,
        key: key.to_owned(),
    }
}

fn invalid(message: impl Into<String>) -> SnapshotError {
    SnapshotError::InvalidState {
        message: message.into(),
    }
}

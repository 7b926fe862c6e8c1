//! Identity-stable entity handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entity::{Entity, EntityKind, Pool, PoolStatus, VirtualMachine};
use crate::machine::SessionId;
use crate::record::{EntityId, EntityRecord, FieldValue};
use crate::store::RecordTable;

/// A long-lived reference to one entity of a session.
///
/// A handle stores no fields. Every read resolves the current record through
/// the store, so reads after a refresh see the new pass, and reads after the
/// entity vanished see the last pass it was present in.
///
/// Handles compare equal when they belong to the same session and refer to
/// the same id, whatever their fields currently are.
pub struct Handle<E> {
    table: Arc<RecordTable<E>>,
    slot: usize,
    id: EntityId,
}

impl<E: Entity> Handle<E> {
    pub(crate) fn new(table: Arc<RecordTable<E>>, slot: usize, id: EntityId) -> Self {
        Self { table, slot, id }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    pub fn session(&self) -> SessionId {
        self.table.session()
    }

    /// Snapshot of the current record.
    pub fn record(&self) -> Arc<EntityRecord<E>> {
        self.table.record(self.slot)
    }

    /// Whether the entity was present in the latest refresh.
    pub fn available(&self) -> bool {
        self.record().available
    }

    /// Current fields, or the last known ones if the entity is unavailable.
    pub fn fields(&self) -> Arc<E> {
        Arc::clone(&self.record().fields)
    }

    pub fn get(&self, field: E::Field) -> FieldValue {
        self.record().fields.get(field)
    }

    /// When the entity was last present in a refresh.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.record().last_seen
    }
}

impl Handle<Pool> {
    pub fn name(&self) -> String {
        self.fields().name.clone()
    }

    pub fn status(&self) -> Option<PoolStatus> {
        self.fields().status
    }
}

impl Handle<VirtualMachine> {
    pub fn name(&self) -> String {
        self.fields().name.clone()
    }

    pub fn is_running(&self) -> bool {
        self.fields().is_running()
    }
}

impl<E> Clone for Handle<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            slot: self.slot,
            id: self.id.clone(),
        }
    }
}

impl<E: Entity> PartialEq for Handle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.table.session() == other.table.session() && self.id == other.id
    }
}

impl<E: Entity> Eq for Handle<E> {}

impl<E: Entity> Hash for Handle<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.session().hash(state);
        E::KIND.hash(state);
        self.id.hash(state);
    }
}

impl<E: Entity> fmt::Debug for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &E::KIND)
            .field("id", &self.id)
            .field("session", &self.table.session())
            .finish()
    }
}

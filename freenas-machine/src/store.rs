//! Per-type entity store.
//!
//! Records live in a dense slot table. Every id gets a slot the first time it
//! is reconciled and keeps it for the life of the session; handles resolve
//! through their slot, so replacing a record never invalidates a handle.
//!
//! Lock order is always `handles` before `slots`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::entity::{DecodeContext, Entity};
use crate::error::ReconcileError;
use crate::handle::Handle;
use crate::machine::SessionId;
use crate::record::{EntityId, EntityRecord, ID_FIELD, RawRecord};

/// Slot table shared between a store and the handles it issued.
pub(crate) struct RecordTable<E> {
    session: SessionId,
    slots: RwLock<Slots<E>>,
}

struct Slots<E> {
    records: Vec<Arc<EntityRecord<E>>>,
    index: HashMap<EntityId, usize>,
}

impl<E> RecordTable<E> {
    pub(crate) fn session(&self) -> SessionId {
        self.session
    }

    /// Current record of an issued slot.
    pub(crate) fn record(&self, slot: usize) -> Arc<EntityRecord<E>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slots.records[slot])
    }
}

/// Counts from one reconcile call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Ids seen for the first time.
    pub added: usize,
    /// Known ids present again in this batch.
    pub updated: usize,
    /// Ids that were available and are missing from this batch.
    pub vanished: usize,
}

/// All entities of one type ever seen by a session.
pub struct Store<E> {
    table: Arc<RecordTable<E>>,
    /// Handles in first-seen order; `handles[slot]` belongs to slot `slot`.
    handles: RwLock<Vec<Arc<Handle<E>>>>,
}

impl<E: Entity> Store<E> {
    pub fn new(session: SessionId) -> Self {
        Self {
            table: Arc::new(RecordTable {
                session,
                slots: RwLock::new(Slots {
                    records: Vec::new(),
                    index: HashMap::new(),
                }),
            }),
            handles: RwLock::new(Vec::new()),
        }
    }

    pub fn session(&self) -> SessionId {
        self.table.session
    }

    /// Merge the complete current collection into the store.
    ///
    /// The whole batch is validated and decoded before anything is applied.
    /// On error the store is unchanged.
    pub fn reconcile(
        &self,
        batch: Vec<RawRecord>,
        ctx: &DecodeContext,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let decoded = decode_batch::<E>(batch, ctx)?;
        let now = Utc::now();
        let mut summary = ReconcileSummary::default();

        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        let mut guard = self.table.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slots = &mut *guard;

        let mut seen = vec![false; slots.records.len()];

        for (id, fields) in decoded {
            let record = Arc::new(EntityRecord::present(id.clone(), fields, now));
            match slots.index.get(&id).copied() {
                Some(slot) => {
                    if !slots.records[slot].available {
                        info!(kind = %E::KIND, id = %id, "Entity available again");
                    }
                    slots.records[slot] = record;
                    seen[slot] = true;
                    summary.updated += 1;
                }
                None => {
                    let slot = slots.records.len();
                    slots.records.push(record);
                    slots.index.insert(id.clone(), slot);
                    handles.push(Arc::new(Handle::new(Arc::clone(&self.table), slot, id.clone())));
                    info!(kind = %E::KIND, id = %id, "Entity discovered");
                    summary.added += 1;
                }
            }
        }

        for (slot, present) in seen.into_iter().enumerate() {
            if present || !slots.records[slot].available {
                continue;
            }
            let gone = Arc::new(slots.records[slot].vanished());
            info!(kind = %E::KIND, id = %gone.id, "Entity no longer available");
            slots.records[slot] = gone;
            summary.vanished += 1;
        }

        debug!(
            kind = %E::KIND,
            added = summary.added,
            updated = summary.updated,
            vanished = summary.vanished,
            total = slots.records.len(),
            "Reconciled"
        );

        Ok(summary)
    }

    /// Every handle ever issued, in first-seen order.
    pub fn handles(&self) -> Vec<Arc<Handle<E>>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The handle for `id`, if it was ever reconciled.
    pub fn handle(&self, id: &EntityId) -> Option<Arc<Handle<E>>> {
        let handles = self.handles.read().unwrap_or_else(PoisonError::into_inner);
        let slots = self.table.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .index
            .get(id)
            .and_then(|&slot| handles.get(slot))
            .cloned()
    }

    /// Current records, in first-seen order.
    pub fn records(&self) -> Vec<Arc<EntityRecord<E>>> {
        self.table
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    /// Number of ids ever seen.
    pub fn len(&self) -> usize {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids present in the latest pass.
    pub fn available_count(&self) -> usize {
        self.table
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .filter(|r| r.available)
            .count()
    }
}

/// Extract ids and decode every record, rejecting the batch on the first problem.
fn decode_batch<E: Entity>(
    batch: Vec<RawRecord>,
    ctx: &DecodeContext,
) -> Result<Vec<(EntityId, E)>, ReconcileError> {
    let mut ids = HashSet::with_capacity(batch.len());
    let mut decoded = Vec::with_capacity(batch.len());

    for (index, raw) in batch.into_iter().enumerate() {
        let id = match raw.get(ID_FIELD) {
            None | Some(Value::Null) => {
                return Err(ReconcileError::MissingId {
                    kind: E::KIND,
                    index,
                });
            }
            Some(value) => EntityId::from_value(value).ok_or_else(|| ReconcileError::InvalidId {
                kind: E::KIND,
                index,
                found: value.to_string(),
            })?,
        };

        if !ids.insert(id.clone()) {
            return Err(ReconcileError::DuplicateId { kind: E::KIND, id });
        }

        let fields = E::decode(raw, ctx).map_err(|source| ReconcileError::Decode {
            kind: E::KIND,
            id: id.clone(),
            source,
        })?;
        decoded.push((id, fields));
    }

    Ok(decoded)
}

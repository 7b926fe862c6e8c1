//! Entity types tracked by a [`Machine`].
//!
//! Each collection the appliance exposes is a typed record implementing
//! [`Entity`]. Fields are declared up front; [`Entity::get`] resolves a
//! per-type field key to a tagged [`FieldValue`].

pub mod disk;
pub mod pool;
pub mod vm;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::machine::Machine;
use crate::record::{EntityRecord, FieldValue, RawRecord};
use crate::store::Store;

pub use disk::{Disk, DiskField, DiskType};
pub use pool::{Pool, PoolField, PoolScan, PoolScanState, PoolStatus, PoolTopology, Vdev};
pub use vm::{VirtualMachine, VmField, VmState, VmStatus};

/// The collections a machine refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Pool,
    Disk,
    Vm,
}

impl EntityKind {
    /// Refresh order. Disks decode against the pools reconciled before them.
    pub const REFRESH_ORDER: [EntityKind; 3] = [EntityKind::Pool, EntityKind::Disk, EntityKind::Vm];

    /// Remote method returning the full collection.
    pub fn method(self) -> &'static str {
        match self {
            EntityKind::Pool => "pool.query",
            EntityKind::Disk => "disk.query",
            EntityKind::Vm => "vm.query",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Pool => "pool",
            EntityKind::Disk => "disk",
            EntityKind::Vm => "vm",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed entity record.
pub trait Entity: DeserializeOwned + fmt::Debug + Send + Sync + Sized + 'static {
    const KIND: EntityKind;

    /// Field keys accepted by [`Entity::get`].
    type Field: Copy + fmt::Debug;

    /// Decode one raw record. The id has already been extracted by the store.
    fn decode(raw: RawRecord, _ctx: &DecodeContext) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(raw))
    }

    fn get(&self, field: Self::Field) -> FieldValue;

    /// The store holding this type inside a machine.
    fn store(machine: &Machine) -> &Store<Self>;
}

/// State from earlier stages of a refresh pass, available while decoding.
#[derive(Debug, Default)]
pub struct DecodeContext {
    pools: Vec<Arc<EntityRecord<Pool>>>,
}

impl DecodeContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the currently available pools of a store.
    pub fn with_pools(pools: &Store<Pool>) -> Self {
        Self {
            pools: pools
                .records()
                .into_iter()
                .filter(|r| r.available)
                .collect(),
        }
    }

    /// Name of the available pool whose topology references `disk`.
    pub fn pool_for_disk(&self, disk: &str) -> Option<String> {
        self.pools
            .iter()
            .find(|r| r.fields.topology.contains_disk(disk))
            .map(|r| r.fields.name.clone())
    }
}

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize as _;
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

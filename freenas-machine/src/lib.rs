//! freenas-machine: identity-stable object model over a FreeNAS/TrueNAS appliance
//!
//! A [`Machine`] polls the appliance for its pools, disks and virtual
//! machines and keeps every entity it has ever seen. Application code holds
//! [`Handle`]s; a handle keeps its identity across refreshes, reads the
//! latest fields while the entity is present, and keeps returning the last
//! known fields once it disappears.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use freenas_machine::{Machine, MachineOptions, MemoryService, PoolField};
//!
//! let service = Arc::new(MemoryService::empty());
//! let machine = Machine::create(service, MachineOptions::default()).await?;
//! for pool in machine.pools()? {
//!     println!("{} available={} {:?}", pool.id(), pool.available(), pool.get(PoolField::Status));
//! }
//! machine.close().await?;
//! ```

pub mod clients;
pub mod entity;
pub mod error;
pub mod handle;
pub mod machine;
pub mod record;
pub mod store;

pub use clients::{FixtureService, MemoryService, QueryService};
pub use entity::{
    DecodeContext, Disk, DiskField, DiskType, Entity, EntityKind, Pool, PoolField, PoolScan,
    PoolScanState, PoolStatus, PoolTopology, Vdev, VirtualMachine, VmField, VmState, VmStatus,
};
pub use error::{Error, KindError, ReconcileError, RefreshFailure, RemoteError, Result};
pub use handle::Handle;
pub use machine::{Machine, MachineOptions, SessionId};
pub use record::{EntityId, EntityRecord, FieldValue, RawRecord};
pub use store::{ReconcileSummary, Store};

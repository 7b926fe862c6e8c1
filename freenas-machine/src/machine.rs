//! The client session: one store per entity type, refreshed from a query service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::QueryService;
use crate::entity::{DecodeContext, Disk, Entity, EntityKind, Pool, VirtualMachine};
use crate::error::{Error, KindError, RefreshFailure, Result};
use crate::handle::Handle;
use crate::record::EntityId;
use crate::store::{ReconcileSummary, Store};

/// Session identifier.
pub type SessionId = Uuid;

/// Options for [`Machine::create`].
#[derive(Debug, Clone)]
pub struct MachineOptions {
    /// Run a first refresh before returning, failing creation if it fails.
    pub refresh_on_create: bool,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            refresh_on_create: true,
        }
    }
}

/// A session against one appliance.
///
/// Handles handed out by a machine stay valid, and keep their identity, for
/// as long as anything holds them. Refreshes are serialized internally;
/// handle reads never wait for a refresh.
pub struct Machine {
    id: SessionId,
    service: Arc<dyn QueryService>,
    pools: Store<Pool>,
    disks: Store<Disk>,
    vms: Store<VirtualMachine>,
    refresh_lock: Mutex<()>,
    closed: AtomicBool,
    passes: AtomicU64,
}

impl Machine {
    /// Create a session without querying the appliance.
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            service,
            pools: Store::new(id),
            disks: Store::new(id),
            vms: Store::new(id),
            refresh_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            passes: AtomicU64::new(0),
        }
    }

    /// Create a session, refreshing once if the options ask for it.
    pub async fn create(service: Arc<dyn QueryService>, options: MachineOptions) -> Result<Self> {
        let machine = Self::new(service);
        info!(session = %machine.id, "Created machine session");
        if options.refresh_on_create {
            machine.refresh().await?;
        }
        Ok(machine)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of completed refresh passes, successful or not.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Query every collection and reconcile it into its store.
    ///
    /// Types are refreshed in [`EntityKind::REFRESH_ORDER`]. A failing type
    /// keeps its previous state and the remaining types are still refreshed,
    /// unless the connection was lost, in which case the session is closed.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.ensure_open()?;

        let mut failures = Vec::new();

        for kind in EntityKind::REFRESH_ORDER {
            let result = match kind {
                EntityKind::Pool => self.refresh_kind::<Pool>().await,
                EntityKind::Disk => self.refresh_kind::<Disk>().await,
                EntityKind::Vm => self.refresh_kind::<VirtualMachine>().await,
            };

            match result {
                Ok(summary) => {
                    debug!(
                        session = %self.id,
                        kind = %kind,
                        added = summary.added,
                        updated = summary.updated,
                        vanished = summary.vanished,
                        "Refreshed"
                    );
                }
                Err(KindError::Remote(e)) if e.is_fatal() => {
                    error!(session = %self.id, kind = %kind, error = %e, "Connection lost, closing session");
                    self.closed.store(true, Ordering::SeqCst);
                    if let Err(close_err) = self.service.close().await {
                        warn!(session = %self.id, error = %close_err, "Failed to release connection");
                    }
                    failures.push(RefreshFailure {
                        kind,
                        error: KindError::Remote(e),
                    });
                    break;
                }
                Err(e) => {
                    warn!(session = %self.id, kind = %kind, error = %e, "Refresh failed");
                    failures.push(RefreshFailure { kind, error: e });
                }
            }
        }

        self.passes.fetch_add(1, Ordering::SeqCst);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Refresh { failures })
        }
    }

    async fn refresh_kind<E: Entity>(&self) -> std::result::Result<ReconcileSummary, KindError> {
        let batch = self.service.query(E::KIND).await?;
        let ctx = match E::KIND {
            EntityKind::Disk => DecodeContext::with_pools(&self.pools),
            _ => DecodeContext::empty(),
        };
        Ok(E::store(self).reconcile(batch, &ctx)?)
    }

    /// Every entity of type `E` ever seen, available or not, in first-seen order.
    pub fn entities_of<E: Entity>(&self) -> Result<Vec<Arc<Handle<E>>>> {
        self.ensure_open()?;
        Ok(E::store(self).handles())
    }

    /// The handle for one id.
    ///
    /// Ids that vanished are still found; ids never reconciled are [`Error::NotFound`].
    pub fn entity<E: Entity>(&self, id: impl Into<EntityId>) -> Result<Arc<Handle<E>>> {
        self.ensure_open()?;
        let id = id.into();
        E::store(self)
            .handle(&id)
            .ok_or(Error::NotFound { kind: E::KIND, id })
    }

    pub fn pools(&self) -> Result<Vec<Arc<Handle<Pool>>>> {
        self.entities_of::<Pool>()
    }

    pub fn disks(&self) -> Result<Vec<Arc<Handle<Disk>>>> {
        self.entities_of::<Disk>()
    }

    pub fn vms(&self) -> Result<Vec<Arc<Handle<VirtualMachine>>>> {
        self.entities_of::<VirtualMachine>()
    }

    pub(crate) fn pool_store(&self) -> &Store<Pool> {
        &self.pools
    }

    pub(crate) fn disk_store(&self) -> &Store<Disk> {
        &self.disks
    }

    pub(crate) fn vm_store(&self) -> &Store<VirtualMachine> {
        &self.vms
    }

    /// Close the session and release the connection.
    ///
    /// Waits for an in-flight refresh. Handles stay readable afterwards.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        info!(session = %self.id, "Closing machine session");
        self.service.close().await?;
        Ok(())
    }
}

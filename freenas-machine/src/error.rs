//! Error types for the machine, its stores and its query services.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::entity::EntityKind;
use crate::record::EntityId;

/// Failure reported by a [`QueryService`](crate::clients::QueryService).
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The remote method returned an error. The connection is still usable.
    #[error("{method} failed: {message}")]
    Query { method: String, message: String },

    /// The remote method did not answer in time.
    #[error("{method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The connection to the appliance is gone.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl RemoteError {
    /// Whether the connection can no longer be used for further queries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::ConnectionLost(_))
    }
}

/// A batch handed to [`Store::reconcile`](crate::store::Store::reconcile) was rejected.
///
/// The store is left exactly as it was before the call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind} record #{index} has no id")]
    MissingId { kind: EntityKind, index: usize },

    #[error("{kind} record #{index} has an unusable id: {found}")]
    InvalidId {
        kind: EntityKind,
        index: usize,
        found: String,
    },

    #[error("{kind} {id} appears more than once in one batch")]
    DuplicateId { kind: EntityKind, id: EntityId },

    #[error("{kind} {id} could not be decoded: {source}")]
    Decode {
        kind: EntityKind,
        id: EntityId,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a single entity type failed during a refresh pass.
#[derive(Debug, Error)]
pub enum KindError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// One failed entity type of a refresh pass.
#[derive(Debug)]
pub struct RefreshFailure {
    pub kind: EntityKind,
    pub error: KindError,
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Errors surfaced by [`Machine`](crate::machine::Machine).
#[derive(Debug, Error)]
pub enum Error {
    /// The session was closed, either explicitly or because the connection was lost.
    #[error("session closed")]
    Closed,

    /// The id was never reconciled for this entity type.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    /// At least one entity type failed to refresh. Types not listed were refreshed.
    #[error("refresh failed: {}", join_failures(.failures))]
    Refresh { failures: Vec<RefreshFailure> },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Failures of a refresh pass, empty for any other error.
    pub fn refresh_failures(&self) -> &[RefreshFailure] {
        match self {
            Error::Refresh { failures } => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[RefreshFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for machine operations.
pub type Result<T> = std::result::Result<T, Error>;

//! In-process query service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{QueryService, raw_records};
use crate::entity::EntityKind;
use crate::error::RemoteError;
use crate::record::RawRecord;

enum Response {
    Records(Vec<RawRecord>),
    Fail(String),
}

/// How long an answer takes, and how long the caller waits for it.
struct Answer {
    delay: Option<Duration>,
    timeout: Option<Duration>,
}

#[derive(Default)]
struct State {
    responses: HashMap<EntityKind, Response>,
    queries: HashMap<EntityKind, usize>,
    delay: Option<Duration>,
    timeout: Option<Duration>,
    disconnected: bool,
    closed: bool,
}

/// Programmable appliance that answers queries from memory.
///
/// Methods without a registered response fail like an unknown method would.
#[derive(Default)]
pub struct MemoryService {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every collection with an empty list.
    pub fn empty() -> Self {
        let service = Self::new();
        for kind in EntityKind::REFRESH_ORDER {
            service.set_records(kind, Vec::new());
        }
        service
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the collection returned for `kind`.
    pub fn set_records(&self, kind: EntityKind, records: Vec<RawRecord>) {
        self.state()
            .responses
            .insert(kind, Response::Records(records));
    }

    /// Replace the collection returned for `kind` with a JSON list of objects.
    pub fn set_json(&self, kind: EntityKind, value: Value) -> Result<(), RemoteError> {
        let records = raw_records(kind.method(), value)?;
        self.set_records(kind, records);
        Ok(())
    }

    /// Make queries for `kind` fail with `message`.
    pub fn fail(&self, kind: EntityKind, message: impl Into<String>) {
        self.state()
            .responses
            .insert(kind, Response::Fail(message.into()));
    }

    /// Drop the connection; every later query fails with [`RemoteError::ConnectionLost`].
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Delay every answer, to keep queries in flight.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Fail answers that take longer than `after` with [`RemoteError::Timeout`].
    pub fn set_timeout(&self, after: Duration) {
        self.state().timeout = Some(after);
    }

    pub fn query_count(&self, kind: EntityKind) -> usize {
        self.state().queries.get(&kind).copied().unwrap_or(0)
    }

    /// Highest number of queries that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn answer(&self, kind: EntityKind) -> (Answer, Result<Vec<RawRecord>, RemoteError>) {
        let mut state = self.state();
        *state.queries.entry(kind).or_default() += 1;

        let result = if state.disconnected || state.closed {
            Err(RemoteError::ConnectionLost("connection reset by peer".to_string()))
        } else {
            match state.responses.get(&kind) {
                Some(Response::Records(records)) => Ok(records.clone()),
                Some(Response::Fail(message)) => Err(RemoteError::Query {
                    method: kind.method().to_string(),
                    message: message.clone(),
                }),
                None => Err(RemoteError::Query {
                    method: kind.method().to_string(),
                    message: "method not found".to_string(),
                }),
            }
        };

        let timing = Answer {
            delay: state.delay,
            timeout: state.timeout,
        };
        (timing, result)
    }
}

#[async_trait]
impl QueryService for MemoryService {
    async fn query(&self, kind: EntityKind) -> Result<Vec<RawRecord>, RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (timing, result) = self.answer(kind);
        let wait = async {
            if let Some(delay) = timing.delay {
                tokio::time::sleep(delay).await;
            }
        };
        let timed_out = match timing.timeout {
            Some(after) => tokio::time::timeout(after, wait).await.err().map(|_| after),
            None => {
                wait.await;
                None
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(after) = timed_out {
            debug!(method = kind.method(), ?after, "Query timed out");
            return Err(RemoteError::Timeout {
                method: kind.method().to_string(),
                after,
            });
        }
        debug!(method = kind.method(), ok = result.is_ok(), "Answered query");
        result
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.state().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_records() {
        let service = MemoryService::new();
        service
            .set_json(EntityKind::Pool, json!([{"id": 1, "name": "tank"}]))
            .unwrap();

        let records = service.query(EntityKind::Pool).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(service.query_count(EntityKind::Pool), 1);
    }

    #[tokio::test]
    async fn test_unregistered_method_fails() {
        let service = MemoryService::new();
        let err = service.query(EntityKind::Vm).await.unwrap_err();

        assert!(matches!(err, RemoteError::Query { ref method, .. } if method == "vm.query"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let service = MemoryService::empty();
        service.disconnect();

        let err = service.query(EntityKind::Disk).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_slow_answer_times_out() {
        let service = MemoryService::empty();
        service.set_delay(Duration::from_millis(200));
        service.set_timeout(Duration::from_millis(10));

        let err = service.query(EntityKind::Pool).await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout { ref method, .. } if method == "pool.query"));
        assert!(!err.is_fatal());
        assert_eq!(service.query_count(EntityKind::Pool), 1);
    }

    #[tokio::test]
    async fn test_close() {
        let service = MemoryService::empty();
        service.close().await.unwrap();

        assert!(service.is_closed());
        assert!(service.query(EntityKind::Pool).await.is_err());
    }
}

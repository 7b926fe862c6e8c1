//! Query service backed by a directory of JSON dumps.
//!
//! Each collection is read from `<dir>/<method>.json` (e.g. `pool.query.json`)
//! on every query, so editing the files between refreshes simulates changes
//! on the appliance.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{QueryService, raw_records};
use crate::entity::EntityKind;
use crate::error::RemoteError;
use crate::record::RawRecord;

pub struct FixtureService {
    dir: PathBuf,
    timeout: Duration,
}

impl FixtureService {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// Path of the dump for `kind`.
    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.method()))
    }

    async fn read(&self, kind: EntityKind) -> Result<Vec<RawRecord>, RemoteError> {
        let method = kind.method();

        if tokio::fs::metadata(&self.dir).await.is_err() {
            return Err(RemoteError::ConnectionLost(format!(
                "fixture directory {} is gone",
                self.dir.display()
            )));
        }

        let path = self.path_for(kind);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RemoteError::Query {
                method: method.to_string(),
                message: format!("{}: {}", path.display(), e),
            })?;

        let value = serde_json::from_str(&text).map_err(|e| RemoteError::Query {
            method: method.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;

        raw_records(method, value)
    }
}

#[async_trait]
impl QueryService for FixtureService {
    async fn query(&self, kind: EntityKind) -> Result<Vec<RawRecord>, RemoteError> {
        debug!(dir = %self.dir.display(), method = kind.method(), "Reading fixture");
        tokio::time::timeout(self.timeout, self.read(kind))
            .await
            .map_err(|_| RemoteError::Timeout {
                method: kind.method().to_string(),
                after: self.timeout,
            })?
    }
}

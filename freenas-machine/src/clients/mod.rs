//! Query services a machine reads its collections from.
//!
//! - [`MemoryService`]: programmable in-process appliance, used by tests
//! - [`FixtureService`]: serves JSON files from a directory

pub mod fixture;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

pub use fixture::FixtureService;
pub use memory::MemoryService;

use crate::entity::EntityKind;
use crate::error::RemoteError;
use crate::record::RawRecord;

/// The remote side of a machine.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Fetch the complete current collection for `kind`.
    async fn query(&self, kind: EntityKind) -> Result<Vec<RawRecord>, RemoteError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Split a JSON result into raw records. The result must be a list of objects.
pub fn raw_records(method: &str, value: Value) -> Result<Vec<RawRecord>, RemoteError> {
    let Value::Array(items) = value else {
        return Err(RemoteError::Query {
            method: method.to_string(),
            message: "expected a list of records".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(RemoteError::Query {
                method: method.to_string(),
                message: format!("record #{} is not an object: {}", index, other),
            }),
        })
        .collect()
}

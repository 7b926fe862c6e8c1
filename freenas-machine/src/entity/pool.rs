//! Storage pools (`pool.query`).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Entity, EntityKind, null_as_default};
use crate::machine::Machine;
use crate::record::{FieldValue, timestamp};
use crate::store::Store;

/// Health of a pool as reported by ZFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    Online,
    Degraded,
    Faulted,
    Offline,
    Removed,
    Unavail,
    #[serde(other)]
    Unknown,
}

impl PoolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolStatus::Online => "ONLINE",
            PoolStatus::Degraded => "DEGRADED",
            PoolStatus::Faulted => "FAULTED",
            PoolStatus::Offline => "OFFLINE",
            PoolStatus::Removed => "REMOVED",
            PoolStatus::Unavail => "UNAVAIL",
            PoolStatus::Unknown => "UNKNOWN",
        }
    }
}

/// State of the last scrub or resilver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolScanState {
    Scanning,
    Finished,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PoolScanState {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolScanState::Scanning => "SCANNING",
            PoolScanState::Finished => "FINISHED",
            PoolScanState::Canceled => "CANCELED",
            PoolScanState::Unknown => "UNKNOWN",
        }
    }
}

/// Progress of the last scrub or resilver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PoolScan {
    /// `SCRUB` or `RESILVER`.
    pub function: Option<String>,
    pub state: Option<PoolScanState>,
    pub percentage: Option<f64>,
    pub errors: Option<i64>,
    pub bytes_to_process: Option<i64>,
    pub bytes_processed: Option<i64>,
    pub bytes_issued: Option<i64>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub pause: Option<DateTime<Utc>>,
}

/// A node of a pool's vdev tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Vdev {
    /// `DISK`, `MIRROR`, `RAIDZ1`, ...
    #[serde(rename = "type", default)]
    pub vdev_type: String,
    pub guid: Option<String>,
    pub status: Option<String>,
    /// Disk name for leaf vdevs.
    pub disk: Option<String>,
    pub path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<Vdev>,
}

impl Vdev {
    fn contains_disk(&self, disk: &str) -> bool {
        self.disk.as_deref() == Some(disk) || self.children.iter().any(|c| c.contains_disk(disk))
    }
}

/// Vdev groups of a pool.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolTopology {
    #[serde(deserialize_with = "null_as_default")]
    pub data: Vec<Vdev>,
    #[serde(deserialize_with = "null_as_default")]
    pub log: Vec<Vdev>,
    #[serde(deserialize_with = "null_as_default")]
    pub cache: Vec<Vdev>,
    #[serde(deserialize_with = "null_as_default")]
    pub spare: Vec<Vdev>,
    #[serde(deserialize_with = "null_as_default")]
    pub special: Vec<Vdev>,
    #[serde(deserialize_with = "null_as_default")]
    pub dedup: Vec<Vdev>,
}

impl PoolTopology {
    fn groups(&self) -> [&[Vdev]; 6] {
        [
            self.data.as_slice(),
            self.log.as_slice(),
            self.cache.as_slice(),
            self.spare.as_slice(),
            self.special.as_slice(),
            self.dedup.as_slice(),
        ]
    }

    /// Whether any vdev in any group references `disk`.
    pub fn contains_disk(&self, disk: &str) -> bool {
        self.groups()
            .iter()
            .any(|group| group.iter().any(|v| v.contains_disk(disk)))
    }
}

/// A ZFS pool.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Pool {
    #[serde(default)]
    pub name: String,
    pub guid: Option<String>,
    pub encrypt: Option<i64>,
    pub encryptkey: Option<String>,
    pub is_decrypted: Option<bool>,
    pub status: Option<PoolStatus>,
    pub scan: Option<PoolScan>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub topology: PoolTopology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolField {
    Name,
    Guid,
    Encrypt,
    EncryptKey,
    IsDecrypted,
    Status,
    ScanFunction,
    ScanState,
    ScanPercentage,
    ScanErrors,
    ScanStartTime,
    ScanEndTime,
}

impl Entity for Pool {
    const KIND: EntityKind = EntityKind::Pool;
    type Field = PoolField;

    fn get(&self, field: PoolField) -> FieldValue {
        let scan = self.scan.as_ref();
        match field {
            PoolField::Name => FieldValue::from(&self.name),
            PoolField::Guid => self.guid.as_ref().into(),
            PoolField::Encrypt => self.encrypt.into(),
            PoolField::EncryptKey => self.encryptkey.as_ref().into(),
            PoolField::IsDecrypted => self.is_decrypted.into(),
            PoolField::Status => self
                .status
                .map_or(FieldValue::Null, |s| FieldValue::Enum(s.as_str())),
            PoolField::ScanFunction => scan.and_then(|s| s.function.as_ref()).into(),
            PoolField::ScanState => scan
                .and_then(|s| s.state)
                .map_or(FieldValue::Null, |s| FieldValue::Enum(s.as_str())),
            PoolField::ScanPercentage => scan.and_then(|s| s.percentage).into(),
            PoolField::ScanErrors => scan.and_then(|s| s.errors).into(),
            PoolField::ScanStartTime => scan.and_then(|s| s.start_time).into(),
            PoolField::ScanEndTime => scan.and_then(|s| s.end_time).into(),
        }
    }

    fn store(machine: &Machine) -> &Store<Self> {
        machine.pool_store()
    }
}

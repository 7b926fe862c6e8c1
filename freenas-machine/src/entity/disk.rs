//! Physical disks (`disk.query`).

use serde::Deserialize;

use super::{DecodeContext, Entity, EntityKind};
use crate::machine::Machine;
use crate::record::{FieldValue, RawRecord};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiskType {
    Hdd,
    Ssd,
    #[serde(other)]
    Unknown,
}

impl DiskType {
    pub fn as_str(self) -> &'static str {
        match self {
            DiskType::Hdd => "HDD",
            DiskType::Ssd => "SSD",
            DiskType::Unknown => "UNKNOWN",
        }
    }
}

/// A disk attached to the appliance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Disk {
    /// Device name, e.g. `ada0`.
    #[serde(default)]
    pub name: String,
    pub serial: Option<String>,
    pub model: Option<String>,
    pub description: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    #[serde(rename = "type")]
    pub disk_type: Option<DiskType>,
    pub rotationrate: Option<i64>,
    /// Pool whose topology references this disk, resolved during refresh.
    #[serde(skip)]
    pub pool: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskField {
    Name,
    Serial,
    Model,
    Description,
    Size,
    Type,
    RotationRate,
    Pool,
}

impl Entity for Disk {
    const KIND: EntityKind = EntityKind::Disk;
    type Field = DiskField;

    fn decode(raw: RawRecord, ctx: &DecodeContext) -> Result<Self, serde_json::Error> {
        let mut disk: Disk = serde_json::from_value(serde_json::Value::Object(raw))?;
        disk.pool = ctx.pool_for_disk(&disk.name);
        Ok(disk)
    }

    fn get(&self, field: DiskField) -> FieldValue {
        match field {
            DiskField::Name => FieldValue::from(&self.name),
            DiskField::Serial => self.serial.as_ref().into(),
            DiskField::Model => self.model.as_ref().into(),
            DiskField::Description => self.description.as_ref().into(),
            DiskField::Size => self.size.into(),
            DiskField::Type => self
                .disk_type
                .map_or(FieldValue::Null, |t| FieldValue::Enum(t.as_str())),
            DiskField::RotationRate => self.rotationrate.into(),
            DiskField::Pool => self.pool.as_ref().into(),
        }
    }

    fn store(machine: &Machine) -> &Store<Self> {
        machine.disk_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Pool;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_disk_fields() {
        let disk = Disk::decode(
            raw(json!({
                "id": "{serial}WD-1234",
                "name": "ada0",
                "serial": "WD-1234",
                "model": "WDC WD40EFRX",
                "size": 4000787030016i64,
                "type": "HDD",
                "rotationrate": 5400,
                "description": ""
            })),
            &DecodeContext::empty(),
        )
        .unwrap();

        assert_eq!(disk.get(DiskField::Name), FieldValue::Text("ada0".into()));
        assert_eq!(disk.get(DiskField::Type), FieldValue::Enum("HDD"));
        assert_eq!(disk.get(DiskField::Size), FieldValue::Int(4000787030016));
        assert_eq!(disk.get(DiskField::RotationRate), FieldValue::Int(5400));
        assert_eq!(disk.get(DiskField::Pool), FieldValue::Null);
    }

    #[test]
    fn test_pool_membership_from_context() {
        let pools: Store<Pool> = Store::new(uuid::Uuid::new_v4());
        pools
            .reconcile(
                vec![raw(json!({
                    "id": 1,
                    "name": "tank",
                    "topology": {"data": [{"type": "DISK", "disk": "ada1", "children": []}]}
                }))],
                &DecodeContext::empty(),
            )
            .unwrap();
        let ctx = DecodeContext::with_pools(&pools);

        let member = Disk::decode(raw(json!({"id": "a1", "name": "ada1"})), &ctx).unwrap();
        let loose = Disk::decode(raw(json!({"id": "a2", "name": "ada2"})), &ctx).unwrap();

        assert_eq!(member.pool.as_deref(), Some("tank"));
        assert_eq!(loose.pool, None);
    }

    #[test]
    fn test_unavailable_pool_is_not_a_parent() {
        let pools: Store<Pool> = Store::new(uuid::Uuid::new_v4());
        let tank = raw(json!({
            "id": 1,
            "name": "tank",
            "topology": {"data": [{"type": "DISK", "disk": "ada1", "children": []}]}
        }));
        pools.reconcile(vec![tank], &DecodeContext::empty()).unwrap();
        pools.reconcile(vec![], &DecodeContext::empty()).unwrap();

        let ctx = DecodeContext::with_pools(&pools);
        let disk = Disk::decode(raw(json!({"id": "a1", "name": "ada1"})), &ctx).unwrap();
        assert_eq!(disk.pool, None);
    }
}

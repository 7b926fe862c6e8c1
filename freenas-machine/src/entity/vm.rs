//! Virtual machines (`vm.query`).

use serde::Deserialize;

use super::{Entity, EntityKind};
use crate::machine::Machine;
use crate::record::FieldValue;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmState {
    Running,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl VmState {
    pub fn as_str(self) -> &'static str {
        match self {
            VmState::Running => "RUNNING",
            VmState::Stopped => "STOPPED",
            VmState::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VmStatus {
    pub state: VmState,
    pub pid: Option<i64>,
}

/// A bhyve virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VirtualMachine {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub vcpus: Option<i64>,
    /// Memory in MiB.
    pub memory: Option<i64>,
    pub autostart: Option<bool>,
    pub status: Option<VmStatus>,
}

impl VirtualMachine {
    pub fn is_running(&self) -> bool {
        self.status.as_ref().map(|s| s.state) == Some(VmState::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmField {
    Name,
    Description,
    Vcpus,
    Memory,
    Autostart,
    State,
    Pid,
}

impl Entity for VirtualMachine {
    const KIND: EntityKind = EntityKind::Vm;
    type Field = VmField;

    fn get(&self, field: VmField) -> FieldValue {
        let status = self.status.as_ref();
        match field {
            VmField::Name => FieldValue::from(&self.name),
            VmField::Description => self.description.as_ref().into(),
            VmField::Vcpus => self.vcpus.into(),
            VmField::Memory => self.memory.into(),
            VmField::Autostart => self.autostart.into(),
            VmField::State => status.map_or(FieldValue::Null, |s| FieldValue::Enum(s.state.as_str())),
            VmField::Pid => status.and_then(|s| s.pid).into(),
        }
    }

    fn store(machine: &Machine) -> &Store<Self> {
        machine.vm_store()
    }
}

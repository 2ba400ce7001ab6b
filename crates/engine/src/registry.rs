//! Device / interface / struct registry: three nested maps keyed by
//! 16-bit name hashes, matching the wire identifiers directly.

use crate::collections::{ChainMap, Fifo};
use crate::error::EngineError;
use crate::fragment::ReassemblyState;

/// A registered in-memory structure: engine-owned bytes rather than a
/// borrowed raw pointer into host memory (see the struct-region design
/// note recorded in DESIGN.md).
pub struct StructRecord {
    pub name: String,
    pub struct_id: u16,
    pub bytes: Vec<u8>,
}

impl StructRecord {
    pub fn read(&self, offset: u16, len: u16) -> Result<&[u8], EngineError> {
        let (offset, len) = (offset as usize, len as usize);
        self.bytes
            .get(offset..offset + len)
            .ok_or(EngineError::RegionOutOfBounds)
    }

    pub fn write(&mut self, offset: u16, data: &[u8]) -> Result<(), EngineError> {
        let offset = offset as usize;
        let end = offset.checked_add(data.len()).ok_or(EngineError::RegionOutOfBounds)?;
        let region = self
            .bytes
            .get_mut(offset..end)
            .ok_or(EngineError::RegionOutOfBounds)?;
        region.copy_from_slice(data);
        Ok(())
    }
}

/// A registered transport interface: its queues, online gate, and the
/// one in-flight reassembly slot it owns.
pub struct InterfaceRecord {
    pub name: String,
    pub interface_id: u16,
    pub max_payload: u32,
    pub rx_queue: Fifo<Vec<u8>>,
    pub tx_queue: Fifo<Vec<u8>>,
    pub reassembly: ReassemblyState,
    pub online: bool,
}

impl InterfaceRecord {
    fn new(name: String, interface_id: u16, max_payload: u32) -> Self {
        Self {
            name,
            interface_id,
            max_payload,
            rx_queue: Fifo::new(),
            tx_queue: Fifo::new(),
            reassembly: ReassemblyState::Idle,
            online: false,
        }
    }
}

/// A registered device: its interfaces and structures, each keyed by
/// the 16-bit hash of its own name.
pub struct DeviceRecord {
    pub name: String,
    pub device_id: u16,
    pub interfaces: ChainMap<InterfaceRecord>,
    pub structs: ChainMap<StructRecord>,
}

/// Interface configuration supplied at registration.
pub struct InterfaceConfig {
    pub name: String,
    pub max_payload: u32,
}

/// Struct configuration supplied at registration. Replaces the source's
/// `{name, base_ptr, size}` with an owned initial byte buffer, per the
/// explicit-handle design note.
pub struct StructConfig {
    pub name: String,
    pub initial: Vec<u8>,
}

/// Device configuration supplied to [`Registry::init_device`].
pub struct DeviceConfig {
    pub name: String,
    pub interfaces: Vec<InterfaceConfig>,
    pub structs: Vec<StructConfig>,
}

/// Top-level registry: one device per engine instance, as an explicit,
/// per-engine handle rather than a process-wide global (see the engine
/// handle design note recorded in DESIGN.md).
#[derive(Default)]
pub struct Registry {
    pub device: Option<DeviceRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self { device: None }
    }

    pub fn init_device(&mut self, config: DeviceConfig) -> Result<(), EngineError> {
        if self.device.is_some() {
            return Err(EngineError::DuplicateDevice);
        }

        let device_id = tst_proto::hash::hash_name(&config.name);
        let mut interfaces = ChainMap::new();
        for iface in config.interfaces {
            let interface_id = tst_proto::hash::hash_name(&iface.name);
            if interfaces.contains(interface_id as u32) {
                return Err(EngineError::DuplicateInterface);
            }
            interfaces.insert(
                interface_id as u32,
                InterfaceRecord::new(iface.name, interface_id, iface.max_payload),
            );
        }

        let mut structs = ChainMap::new();
        for s in config.structs {
            let struct_id = tst_proto::hash::hash_name(&s.name);
            if structs.contains(struct_id as u32) {
                return Err(EngineError::DuplicateStruct);
            }
            structs.insert(
                struct_id as u32,
                StructRecord {
                    name: s.name,
                    struct_id,
                    bytes: s.initial,
                },
            );
        }

        self.device = Some(DeviceRecord {
            name: config.name,
            device_id,
            interfaces,
            structs,
        });
        Ok(())
    }

    pub fn device(&self) -> Result<&DeviceRecord, EngineError> {
        self.device.as_ref().ok_or(EngineError::NotInitialized)
    }

    pub fn device_mut(&mut self) -> Result<&mut DeviceRecord, EngineError> {
        self.device.as_mut().ok_or(EngineError::NotInitialized)
    }

    pub fn interface(&self, interface_id: u16) -> Result<&InterfaceRecord, EngineError> {
        self.device()?
            .interfaces
            .get(interface_id as u32)
            .ok_or(EngineError::UnknownInterface)
    }

    pub fn interface_mut(&mut self, interface_id: u16) -> Result<&mut InterfaceRecord, EngineError> {
        self.device_mut()?
            .interfaces
            .get_mut(interface_id as u32)
            .ok_or(EngineError::UnknownInterface)
    }

    pub fn interface_by_name(&self, name: &str) -> Result<&InterfaceRecord, EngineError> {
        self.interface(tst_proto::hash::hash_name(name))
    }

    pub fn interface_by_name_mut(&mut self, name: &str) -> Result<&mut InterfaceRecord, EngineError> {
        self.interface_mut(tst_proto::hash::hash_name(name))
    }

    pub fn struct_record(&self, struct_id: u16) -> Result<&StructRecord, EngineError> {
        self.device()?
            .structs
            .get(struct_id as u32)
            .ok_or(EngineError::UnknownStruct)
    }

    pub fn struct_record_mut(&mut self, struct_id: u16) -> Result<&mut StructRecord, EngineError> {
        self.device_mut()?
            .structs
            .get_mut(struct_id as u32)
            .ok_or(EngineError::UnknownStruct)
    }

    pub fn struct_by_name(&self, name: &str) -> Result<&StructRecord, EngineError> {
        self.struct_record(tst_proto::hash::hash_name(name))
    }

    pub fn struct_by_name_mut(&mut self, name: &str) -> Result<&mut StructRecord, EngineError> {
        self.struct_record_mut(tst_proto::hash::hash_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DeviceConfig {
        DeviceConfig {
            name: "D".into(),
            interfaces: vec![InterfaceConfig {
                name: "S".into(),
                max_payload: 100,
            }],
            structs: vec![StructConfig {
                name: "V".into(),
                initial: vec![0; 4],
            }],
        }
    }

    #[test]
    fn init_registers_device_interface_and_struct() {
        let mut registry = Registry::new();
        registry.init_device(sample_config()).unwrap();
        assert!(registry.interface_by_name("S").is_ok());
        assert!(registry.struct_by_name("V").is_ok());
    }

    #[test]
    fn repeat_init_fails_and_does_not_mutate_state() {
        let mut registry = Registry::new();
        registry.init_device(sample_config()).unwrap();
        let err = registry.init_device(sample_config()).unwrap_err();
        assert_eq!(err, EngineError::DuplicateDevice);
        assert!(registry.struct_by_name("V").is_ok());
    }

    #[test]
    fn struct_write_out_of_bounds_is_refused() {
        let mut registry = Registry::new();
        registry.init_device(sample_config()).unwrap();
        let record = registry.struct_by_name_mut("V").unwrap();
        let err = record.write(2, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, EngineError::RegionOutOfBounds);
    }

    #[test]
    fn lookup_before_init_is_not_initialized() {
        let registry = Registry::new();
        assert_eq!(
            registry.struct_by_name("V").unwrap_err(),
            EngineError::NotInitialized
        );
    }
}

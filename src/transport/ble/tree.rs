//! Discovered GATT tree with a characteristic index

use std::{collections::HashMap, fmt::Write};

use uuid::Uuid;

use crate::core::types::{CharacteristicInfo, ServiceInfo};

use super::uuids::uuid_name;

/// Services discovered on the connected peer
///
/// Characteristics are indexed by UUID; when a UUID appears more than once
/// the first one in discovery order wins.
#[derive(Debug, Clone, Default)]
pub struct GattTree {
    services: Vec<ServiceInfo>,
    index: HashMap<Uuid, (usize, usize)>,
}

impl GattTree {
    pub fn new(services: Vec<ServiceInfo>) -> Self {
        let mut index = HashMap::new();
        for (s, service) in services.iter().enumerate() {
            for (c, characteristic) in service.characteristics.iter().enumerate() {
                index.entry(characteristic.uuid).or_insert((s, c));
            }
        }
        Self { services, index }
    }

    pub fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    pub fn service(&self, uuid: &Uuid) -> Option<&ServiceInfo> {
        self.services.iter().find(|service| service.uuid == *uuid)
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicInfo> {
        let &(s, c) = self.index.get(uuid)?;
        self.services.get(s)?.characteristics.get(c)
    }

    /// Indented dump of services, characteristics and descriptors
    pub fn render(&self) -> String {
        fn label(uuid: &Uuid) -> String {
            match uuid_name(uuid) {
                Some(name) => format!("{uuid} ({name})"),
                None => uuid.to_string(),
            }
        }

        let mut out = String::new();
        for service in &self.services {
            let _ = writeln!(out, "Service {} [0x{:04X}]", label(&service.uuid), service.id);
            for characteristic in &service.characteristics {
                let _ = writeln!(
                    out,
                    "  Characteristic {} [0x{:04X}] {}",
                    label(&characteristic.uuid),
                    characteristic.id,
                    characteristic.properties
                );
                for descriptor in &characteristic.descriptors {
                    let _ = writeln!(
                        out,
                        "    Descriptor {} [0x{:04X}]",
                        label(&descriptor.uuid),
                        descriptor.id
                    );
                }
            }
        }
        out
    }
}

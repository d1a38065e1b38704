//! Ordered collection of the outlets an application declared.
//!
//! Insertion order matters: it is the order subscriptions go out, the order
//! of the timeout sweep, and the priority of wildcard binding.

use std::net::IpAddr;

use thiserror::Error;

use crate::device::{Device, DeviceId, DeviceSpec};
use crate::protocol::MacAddr;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("MAC {0} already belongs to another device")]
    DuplicateMac(MacAddr),
    #[error("Device {0} is already bound")]
    AlreadyBound(DeviceId),
    #[error("No device {0}")]
    UnknownDevice(DeviceId),
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    next_id: u32,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outlet. A concrete MAC may only be declared once.
    pub fn add(&mut self, spec: DeviceSpec) -> Result<DeviceId, RegistryError> {
        if let Some(mac) = spec.mac
            && self.find(&mac).is_some()
        {
            return Err(RegistryError::DuplicateMac(mac));
        }
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        self.devices.push(Device::new(id, spec));
        Ok(id)
    }

    /// Remove an outlet. Its id is never handed out again, so stale ids
    /// simply stop resolving.
    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        let index = self.index_of(id)?;
        Some(self.devices.remove(index))
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    /// First bound entry with this MAC.
    pub fn find(&self, mac: &MacAddr) -> Option<&Device> {
        self.devices.iter().find(|d| d.bound_mac() == Some(*mac))
    }

    /// First entry that is still a wildcard, in insertion order.
    pub fn first_wildcard(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_wildcard())
    }

    /// Turn a wildcard into a concrete entry. Irreversible.
    pub fn bind(
        &mut self,
        id: DeviceId,
        mac: MacAddr,
        address: IpAddr,
    ) -> Result<(), RegistryError> {
        if let Some(owner) = self.find(&mac) {
            return Err(if owner.id() == id {
                RegistryError::AlreadyBound(id)
            } else {
                RegistryError::DuplicateMac(mac)
            });
        }
        let device = self.get_mut(id).ok_or(RegistryError::UnknownDevice(id))?;
        if !device.is_wildcard() {
            return Err(RegistryError::AlreadyBound(id));
        }
        device.bind(mac);
        device.set_address(address);
        Ok(())
    }

    /// Ids in insertion order. Iterating a snapshot keeps a walk valid
    /// even if entries are removed between steps.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(Device::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn index_of(&self, id: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| d.id() == id)
    }
}

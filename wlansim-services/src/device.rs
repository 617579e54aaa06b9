//! Simulated device model.
//!
//! Devices live in an arena and services refer to them by index, so a
//! service never holds a back-reference into the arena.

use std::net::Ipv4Addr;

use wlansim_core::MacAddr;

pub type DeviceId = usize;

/// AP lifecycle against the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApState {
    Discover,
    Join,
    Run,
    Closed,
}

/// Client lifecycle against its AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Association,
    IpLearn,
    Run,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Ap(ApState),
    Client(ClientState),
}

impl DeviceState {
    pub fn is_ap(&self) -> bool {
        matches!(self, DeviceState::Ap(_))
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub mac: MacAddr,
    pub ipv4: Option<Ipv4Addr>,
    pub udp_port: Option<u16>,
    /// Radio MAC, APs only.
    pub radio_mac: Option<MacAddr>,
    /// Owning AP's MAC, clients only.
    pub ap_mac: Option<MacAddr>,
    pub state: DeviceState,
    /// Worker connection the device's frames travel through.
    pub connection_id: usize,
}

impl Device {
    pub fn ap(
        mac: MacAddr,
        ipv4: Ipv4Addr,
        udp_port: u16,
        radio_mac: MacAddr,
        connection_id: usize,
    ) -> Device {
        Device {
            mac,
            ipv4: Some(ipv4),
            udp_port: Some(udp_port),
            radio_mac: Some(radio_mac),
            ap_mac: None,
            state: DeviceState::Ap(ApState::Discover),
            connection_id,
        }
    }

    pub fn client(
        mac: MacAddr,
        ipv4: Option<Ipv4Addr>,
        ap_mac: MacAddr,
        connection_id: usize,
    ) -> Device {
        Device {
            mac,
            ipv4,
            udp_port: None,
            radio_mac: None,
            ap_mac: Some(ap_mac),
            state: DeviceState::Client(ClientState::Association),
            connection_id,
        }
    }
}

/// Index-addressed device storage.
#[derive(Default)]
pub struct DeviceArena {
    devices: Vec<Device>,
}

impl DeviceArena {
    pub fn new() -> DeviceArena {
        DeviceArena::default()
    }

    pub fn insert(&mut self, device: Device) -> DeviceId {
        self.devices.push(device);
        self.devices.len() - 1
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub fn find_by_mac(&self, mac: MacAddr) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.mac == mac)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &Device)> {
        self.devices.iter().enumerate()
    }
}

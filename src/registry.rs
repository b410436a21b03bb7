use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::probe::ProbeOutcome;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Prefix used to select rows of the local table from the menu.
pub const LOCAL_PREFIX: char = 'l';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Reached through the overlay network (tailnet, wireguard mesh, ...).
    Overlay,
    /// Lives on the local subnet.
    Local,
}

impl DeviceClass {
    pub fn title(&self) -> &'static str {
        match self {
            DeviceClass::Overlay => "Overlay network",
            DeviceClass::Local => "Local network",
        }
    }

    /// Menu label of the `position`-th (0-based) row in this class.
    pub fn label(&self, position: usize) -> String {
        match self {
            DeviceClass::Overlay => format!("{}", position + 1),
            DeviceClass::Local => format!("{}{}", LOCAL_PREFIX, position + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reachability {
    Unknown,
    Online { latency_ms: f64 },
    Offline,
}

impl Reachability {
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Reachability::Online { latency_ms } => Some(*latency_ms),
            _ => None,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Unknown => write!(f, "unknown"),
            Reachability::Online { .. } => write!(f, "online"),
            Reachability::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub address: String,
    pub class: DeviceClass,
    pub description: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    status: Reachability,
    last_checked: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>, class: DeviceClass) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            class,
            description: None,
            port: DEFAULT_SSH_PORT,
            user: None,
            status: Reachability::Unknown,
            last_checked: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn status(&self) -> Reachability {
        self.status
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.status, Reachability::Offline)
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    /// The only way a device's health fields change.
    pub fn record(&mut self, outcome: ProbeOutcome) {
        self.status = match outcome {
            ProbeOutcome::Reachable { latency_ms } => Reachability::Online { latency_ms },
            ProbeOutcome::Unreachable => Reachability::Offline,
        };
        self.last_checked = Some(Utc::now());
    }
}

/// A resolved menu selection: `class` table, 0-based `position` within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub class: DeviceClass,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct Registry {
    devices: Vec<Device>,
}

impl Registry {
    pub fn new(devices: Vec<Device>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.name.as_str()) {
                return Err(RegistryError::DuplicateName(device.name.clone()));
            }
        }
        Ok(Self { devices })
    }

    /// The hosts this tool ships with.
    pub fn builtin() -> Self {
        use DeviceClass::*;

        let devices = vec![
            Device::new("homelab", "100.101.12.4", Overlay).with_description("Proxmox host"),
            Device::new("nas", "100.101.12.9", Overlay).with_description("TrueNAS storage"),
            Device::new("vps", "100.88.40.2", Overlay)
                .with_description("Public VPS")
                .with_port(2222)
                .with_user("admin"),
            Device::new("workstation", "100.77.3.18", Overlay),
            Device::new("router", "192.168.1.1", Local)
                .with_description("Gateway")
                .with_user("root"),
            Device::new("pi", "192.168.1.50", Local)
                .with_description("Raspberry Pi, DNS sink")
                .with_user("pi"),
            Device::new("printer-box", "192.168.1.64", Local),
        ];

        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    /// Devices of one class in declaration order, with their registry index.
    pub fn partition(&self, class: DeviceClass) -> impl Iterator<Item = (usize, &Device)> + '_ {
        self.devices
            .iter()
            .enumerate()
            .filter(move |(_, d)| d.class == class)
    }

    /// Registry index of the selected row, if it exists.
    pub fn resolve(&self, selection: Selection) -> Option<usize> {
        self.partition(selection.class)
            .nth(selection.position)
            .map(|(index, _)| index)
    }

    /// Addresses to probe, in registry order.
    pub fn targets(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.address.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> Registry {
        Registry::new(vec![
            Device::new("a", "10.0.0.1", DeviceClass::Local),
            Device::new("b", "100.64.0.1", DeviceClass::Overlay),
            Device::new("c", "10.0.0.2", DeviceClass::Local),
            Device::new("d", "100.64.0.2", DeviceClass::Overlay),
        ])
        .unwrap()
    }

    #[test]
    fn test_partitions_keep_declaration_order() {
        let registry = mixed();
        let overlay: Vec<_> = registry
            .partition(DeviceClass::Overlay)
            .map(|(_, d)| d.name.as_str())
            .collect();
        let local: Vec<_> = registry
            .partition(DeviceClass::Local)
            .map(|(_, d)| d.name.as_str())
            .collect();
        assert_eq!(overlay, ["b", "d"]);
        assert_eq!(local, ["a", "c"]);
    }

    #[test]
    fn test_resolve_selection() {
        let registry = mixed();
        let second_local = Selection {
            class: DeviceClass::Local,
            position: 1,
        };
        assert_eq!(registry.resolve(second_local), Some(2));

        let missing = Selection {
            class: DeviceClass::Overlay,
            position: 2,
        };
        assert_eq!(registry.resolve(missing), None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Registry::new(vec![
            Device::new("dup", "10.0.0.1", DeviceClass::Local),
            Device::new("dup", "10.0.0.2", DeviceClass::Overlay),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateName(name)) if name == "dup"));
    }

    #[test]
    fn test_builtin_names_unique() {
        let builtin = Registry::builtin();
        assert!(Registry::new(builtin.devices().to_vec()).is_ok());
    }

    #[test]
    fn test_record_keeps_latency_with_online() {
        let mut device = Device::new("a", "10.0.0.1", DeviceClass::Local);
        assert_eq!(device.status(), Reachability::Unknown);
        assert!(device.last_checked().is_none());

        device.record(ProbeOutcome::Reachable { latency_ms: 4.2 });
        assert_eq!(device.status().latency_ms(), Some(4.2));
        assert!(device.last_checked().is_some());

        device.record(ProbeOutcome::Unreachable);
        assert!(device.is_offline());
        assert_eq!(device.status().latency_ms(), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(DeviceClass::Overlay.label(0), "1");
        assert_eq!(DeviceClass::Local.label(2), "l3");
    }
}

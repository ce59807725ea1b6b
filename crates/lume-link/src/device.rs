//! Accessory identity
//!
//! A `DeviceHandle` is re-created on every discovery observation; only the
//! hardware address is stable, so equality and hashing use the address alone.

use serde::{Deserialize, Serialize};

/// Identifies one physical lighting accessory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Stable hardware address (e.g. "C4:5E:12:0A:99:F1")
    pub address: String,
    /// Signal strength at the time of observation (dBm, more negative = weaker)
    #[serde(default)]
    pub rssi: i16,
    /// Human-readable name advertised by the accessory, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DeviceHandle {
    /// Create a handle for a bare address (RSSI unknown, no name).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rssi: 0,
            name: None,
        }
    }

    /// Attach an observed signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Attach an advertised name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display label: advertised name if present, address otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for DeviceHandle {}

impl std::hash::Hash for DeviceHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

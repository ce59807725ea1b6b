//! Transmission gateway abstraction
//!
//! The gateway is the black-box short-range radio transport. It performs
//! discovery, bonding lookup, connect/disconnect, and delivers opaque
//! fixed-size frames to the accessory. Its internal protocol is not part of
//! this crate; platform adapters implement [`TransmissionGateway`].

use crate::device::DeviceHandle;
use std::collections::HashSet;
use std::time::Duration;

/// Error type for gateway operations
///
/// Every variant is recoverable from the session's point of view: failures
/// surface as state transitions, never as session teardown.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The host environment denied radio access. Callers must treat this as
    /// "stay in the current state", not as a fault.
    #[error("radio permission denied by host environment")]
    PermissionDenied,

    #[error("gateway adapter unavailable: {0}")]
    Unavailable(String),

    #[error("connect attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("device {0} is not reachable")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Per-address link status change pushed by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link to `address` is established.
    Up { address: String },
    /// The link to `address` is lost.
    Down { address: String },
}

impl LinkEvent {
    /// The address this event concerns.
    pub fn address(&self) -> &str {
        match self {
            LinkEvent::Up { address } | LinkEvent::Down { address } => address,
        }
    }
}

/// Address allow-list for a discovery scan.
///
/// Auto-reconnect scans are restricted to the bonded set so that unrelated
/// accessories in range are never picked up.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryFilter {
    addresses: HashSet<String>,
}

impl DiscoveryFilter {
    /// Build a filter from a set of known handles.
    pub fn from_handles(handles: &[DeviceHandle]) -> Self {
        Self {
            addresses: handles.iter().map(|h| h.address.clone()).collect(),
        }
    }

    /// Whether an observed address passes the filter.
    pub fn matches(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// Number of allowed addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when the filter allows nothing (discovery is pointless).
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Black-box radio transport consumed by the session manager and the
/// orchestrator's dispatch point.
///
/// `discover` blocks for the requested window and returns the observations
/// made during it, in observation order (later entries were seen more
/// recently). `link_events` hands out a push feed of per-address status
/// changes; the session manager subscribes once for its lifetime.
pub trait TransmissionGateway: Send + Sync {
    /// Previously-bonded accessories of this product family.
    fn bonded_devices(&self) -> Result<Vec<DeviceHandle>, GatewayError>;

    /// Run a bounded scan restricted to `filter`, returning observations in
    /// observation order.
    fn discover(
        &self,
        filter: &DiscoveryFilter,
        window: Duration,
    ) -> Result<Vec<DeviceHandle>, GatewayError>;

    /// Attempt to connect, blocking up to `timeout`.
    fn connect(&self, handle: &DeviceHandle, timeout: Duration) -> Result<(), GatewayError>;

    /// Tear down the link. Best effort; the session state does not depend on
    /// this succeeding.
    fn disconnect(&self, handle: &DeviceHandle) -> Result<(), GatewayError>;

    /// Deliver one opaque frame to the accessory.
    fn send(&self, handle: &DeviceHandle, frame: &[u8]) -> Result<(), GatewayError>;

    /// Push feed of per-address link status changes.
    fn link_events(&self) -> flume::Receiver<LinkEvent>;
}

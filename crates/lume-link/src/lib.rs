//! Device session and transport abstraction for the lume lighting stick
//!
//! This crate provides:
//! - Accessory identity (`DeviceHandle`, address-keyed)
//! - The `TransmissionGateway` trait wrapping the black-box radio transport
//! - A single-writer observable value holder (`StateCell` / `StateReader`)
//! - `ConnectionSessionManager`: bonded-set discovery, auto-reconnect,
//!   and the observable connection state
//!
//! # Architecture
//!
//! ```text
//! gateway link feed → flume channel → watcher thread → ConnectionState cell
//! start_auto_connect() → discovery thread (generation-tagged) ┘
//! ```
//!
//! The gateway pushes link events from its own context; the session manager
//! bridges them through a flume channel onto its watcher thread and is the
//! only writer of the connection state. Discovery/connect attempts run on
//! short-lived worker threads and carry a generation number, so a newer
//! `retry()` or `disconnect()` supersedes them rather than racing them.

mod device;
mod gateway;
mod session;
mod state_cell;

pub use device::DeviceHandle;
pub use gateway::{DiscoveryFilter, GatewayError, LinkEvent, TransmissionGateway};
pub use session::{
    ConnectionSessionManager, ConnectionState, DiscoveryFailure, SessionConfig, SessionEvent,
};
pub use state_cell::{StateCell, StateReader};

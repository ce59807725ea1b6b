//! Device session lifecycle
//!
//! Owns the single "current device session": bonded-set filtered discovery,
//! automatic reconnection, and the observable connection state. The state has
//! exactly one current value at any time; transitions are serialized behind a
//! transition lock, and every in-flight attempt carries a generation number so
//! a superseding `retry()` or `disconnect()` cancels it instead of letting a
//! stale result clobber newer state.

use crate::device::DeviceHandle;
use crate::gateway::{DiscoveryFilter, GatewayError, LinkEvent, TransmissionGateway};
use crate::state_cell::{StateCell, StateReader};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Why the last auto-connect attempt did not end in `Connected`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryFailure {
    #[error("no bonded accessory answered within the discovery window")]
    NothingInRange,

    #[error("connect attempt failed: {0}")]
    ConnectFailed(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

/// Observable connection state. Single writer: [`ConnectionSessionManager`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// No bonded accessory, or the session was torn down.
    NoKnownDevice,
    /// A bounded discovery window is running.
    Discovering,
    /// The last attempt failed; retry is available. Expected steady state,
    /// not a fault.
    DiscoveryFailed(DiscoveryFailure),
    /// Live link to the accessory.
    Connected(DeviceHandle),
}

impl ConnectionState {
    /// Whether frames can currently be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// The connected handle, if any.
    pub fn connected_handle(&self) -> Option<&DeviceHandle> {
        match self {
            ConnectionState::Connected(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Session lifecycle notifications for collaborators that must react to the
/// link coming and going (the orchestrator plays its connection-confirmation
/// burst off this feed).
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connected(DeviceHandle),
    Disconnected,
}

/// Timing knobs for the auto-connect flow.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Bounded discovery window length.
    pub discovery_window: Duration,
    /// Per-attempt connect timeout.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_window: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// State shared between the public surface, attempt threads, and the link
/// watcher thread.
struct SessionShared {
    gateway: Arc<dyn TransmissionGateway>,
    config: SessionConfig,
    state: StateCell<ConnectionState>,
    /// Bumped by every new attempt, `disconnect()`, and link loss. An attempt
    /// whose generation is stale abandons its result.
    generation: AtomicU64,
    /// Serializes compound check-generation-then-commit transitions.
    transition: Mutex<()>,
    /// Addresses the gateway currently reports as up.
    links_up: Mutex<HashSet<String>>,
    events: Mutex<Vec<flume::Sender<SessionEvent>>>,
}

impl SessionShared {
    fn generation_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Commit a transition. When `generation` is given, the commit only
    /// happens if no newer attempt has superseded it. Returns whether the
    /// transition was applied.
    fn try_transition(&self, generation: Option<u64>, new_state: ConnectionState) -> bool {
        let _guard = match self.transition.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(generation) = generation {
            if !self.generation_current(generation) {
                log::debug!("session: dropping stale transition to {:?}", new_state);
                return false;
            }
        }
        if self.state.get() == new_state {
            return true;
        }
        log::info!("session: {:?} -> {:?}", self.state.get(), new_state);
        self.state.set(new_state);
        true
    }

    fn publish_event(&self, event: SessionEvent) {
        if let Ok(mut subs) = self.events.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn link_is_up(&self, address: &str) -> bool {
        self.links_up
            .lock()
            .map(|set| set.contains(address))
            .unwrap_or(false)
    }

    fn mark_link(&self, address: &str, up: bool) {
        if let Ok(mut set) = self.links_up.lock() {
            if up {
                set.insert(address.to_string());
            } else {
                set.remove(address);
            }
        }
    }
}

/// Manages the single current device session.
///
/// Construction subscribes to the gateway's link-event feed for the lifetime
/// of the session and reconciles it against the observable state: an address
/// reported up becomes the current connection (unless a different one is
/// still live), and loss of the current address demotes immediately to
/// `NoKnownDevice`, cancelling any in-flight discovery.
pub struct ConnectionSessionManager {
    shared: Arc<SessionShared>,
    watcher_shutdown: Arc<AtomicBool>,
    watcher: Option<thread::JoinHandle<()>>,
}

impl ConnectionSessionManager {
    pub fn new(gateway: Arc<dyn TransmissionGateway>, config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared {
            gateway: Arc::clone(&gateway),
            config,
            state: StateCell::new(ConnectionState::NoKnownDevice),
            generation: AtomicU64::new(0),
            transition: Mutex::new(()),
            links_up: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
        });

        let link_rx = gateway.link_events();
        let watcher_shutdown = Arc::new(AtomicBool::new(false));
        let watcher = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&watcher_shutdown);
            thread::Builder::new()
                .name("lume-link-watch".into())
                .spawn(move || Self::watch_links(shared, link_rx, shutdown))
                .expect("Failed to spawn link watcher thread")
        };

        Self {
            shared,
            watcher_shutdown,
            watcher: Some(watcher),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Reader handle for the observable connection state.
    pub fn state_reader(&self) -> StateReader<ConnectionState> {
        self.shared.state.reader()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe_events(&self) -> flume::Receiver<SessionEvent> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subs) = self.shared.events.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Start the auto-connect flow.
    ///
    /// No-op when already connected. With no bonded accessory the state lands
    /// in `NoKnownDevice` without scanning. Otherwise a bounded discovery
    /// window runs on a worker thread, the best-signal bonded candidate is
    /// connected, and the state ends in `Connected` or `DiscoveryFailed`.
    pub fn start_auto_connect(&self) {
        if self.shared.state.get().is_connected() {
            log::debug!("session: auto-connect skipped, already connected");
            return;
        }

        // A new generation supersedes any attempt still in flight.
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let bonded = match self.shared.gateway.bonded_devices() {
            Ok(bonded) => bonded,
            Err(GatewayError::PermissionDenied) => {
                // Permission gaps never crash the session; the state simply
                // stays where it is until the host grants access.
                log::warn!("session: bonded-device lookup denied by host");
                return;
            }
            Err(e) => {
                log::warn!("session: bonded-device lookup failed: {}", e);
                self.shared.try_transition(
                    Some(generation),
                    ConnectionState::DiscoveryFailed(DiscoveryFailure::GatewayUnavailable(
                        e.to_string(),
                    )),
                );
                return;
            }
        };

        if bonded.is_empty() {
            log::info!("session: no bonded accessory, discovery skipped");
            self.shared
                .try_transition(Some(generation), ConnectionState::NoKnownDevice);
            return;
        }

        self.shared
            .try_transition(Some(generation), ConnectionState::Discovering);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("lume-discover".into())
            .spawn(move || Self::run_attempt(shared, generation, bonded));
        if let Err(e) = spawned {
            log::error!("session: failed to spawn discovery thread: {}", e);
            self.shared.try_transition(
                Some(generation),
                ConnectionState::DiscoveryFailed(DiscoveryFailure::GatewayUnavailable(
                    e.to_string(),
                )),
            );
        }
    }

    /// User-triggered retry. Safe to call repeatedly and while a previous
    /// attempt is still in flight; the new attempt supersedes the old one.
    pub fn retry(&self) {
        self.start_auto_connect();
    }

    /// Explicit user-initiated teardown. Always lands in `NoKnownDevice`,
    /// regardless of gateway success, so the UI can never show an accessory
    /// the app no longer controls.
    pub fn disconnect(&self) {
        // Cancel any in-flight attempt first.
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        if let ConnectionState::Connected(handle) = self.shared.state.get() {
            if let Err(e) = self.shared.gateway.disconnect(&handle) {
                log::warn!("session: gateway disconnect failed: {}", e);
            }
            self.shared.mark_link(&handle.address, false);
            self.shared.publish_event(SessionEvent::Disconnected);
        }

        self.shared
            .try_transition(None, ConnectionState::NoKnownDevice);
    }

    /// One discovery + connect attempt, running on its own thread.
    fn run_attempt(shared: Arc<SessionShared>, generation: u64, bonded: Vec<DeviceHandle>) {
        let filter = DiscoveryFilter::from_handles(&bonded);
        let observed = match shared.gateway.discover(&filter, shared.config.discovery_window) {
            Ok(observed) => observed,
            Err(e) => {
                log::warn!("session: discovery failed: {}", e);
                shared.try_transition(
                    Some(generation),
                    ConnectionState::DiscoveryFailed(DiscoveryFailure::GatewayUnavailable(
                        e.to_string(),
                    )),
                );
                return;
            }
        };

        // Best-signal candidate; equal RSSI resolves to the most recently
        // observed entry (observations arrive in order).
        let best = observed
            .iter()
            .enumerate()
            .filter(|(_, h)| filter.matches(&h.address))
            .max_by(|(ia, a), (ib, b)| a.rssi.cmp(&b.rssi).then(ia.cmp(ib)))
            .map(|(_, h)| h.clone());

        let Some(candidate) = best else {
            shared.try_transition(
                Some(generation),
                ConnectionState::DiscoveryFailed(DiscoveryFailure::NothingInRange),
            );
            return;
        };

        if !shared.generation_current(generation) {
            log::debug!("session: attempt superseded before connect");
            return;
        }

        log::info!(
            "session: connecting to {} (rssi {})",
            candidate.label(),
            candidate.rssi
        );
        match shared
            .gateway
            .connect(&candidate, shared.config.connect_timeout)
        {
            Ok(()) => {
                if shared.try_transition(
                    Some(generation),
                    ConnectionState::Connected(candidate.clone()),
                ) {
                    shared.mark_link(&candidate.address, true);
                    shared.publish_event(SessionEvent::Connected(candidate));
                } else {
                    // A newer attempt or a disconnect won the race; release
                    // the link this stale attempt opened.
                    let _ = shared.gateway.disconnect(&candidate);
                }
            }
            Err(e) => {
                log::warn!("session: connect to {} failed: {}", candidate.label(), e);
                shared.try_transition(
                    Some(generation),
                    ConnectionState::DiscoveryFailed(DiscoveryFailure::ConnectFailed(
                        e.to_string(),
                    )),
                );
            }
        }
    }

    /// Reconciliation loop for the gateway's link-status feed.
    fn watch_links(
        shared: Arc<SessionShared>,
        rx: flume::Receiver<LinkEvent>,
        shutdown: Arc<AtomicBool>,
    ) {
        log::debug!("session: link watcher started");
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(LinkEvent::Up { address }) => {
                    shared.mark_link(&address, true);
                    match shared.state.get() {
                        ConnectionState::Connected(current) if current.address == address => {}
                        ConnectionState::Connected(current)
                            if shared.link_is_up(&current.address) =>
                        {
                            // The current link is still live; a second
                            // accessory coming up does not steal the session.
                            log::debug!(
                                "session: ignoring link-up for {} while {} is connected",
                                address,
                                current.address
                            );
                        }
                        _ => {
                            // Either nothing is connected or the recorded
                            // handle is stale; the live address becomes the
                            // session. Resolve it against the bonded set so
                            // the UI gets the advertised name, not the raw
                            // address.
                            shared.generation.fetch_add(1, Ordering::SeqCst);
                            let handle = shared
                                .gateway
                                .bonded_devices()
                                .ok()
                                .and_then(|bonded| {
                                    bonded.into_iter().find(|h| h.address == address)
                                })
                                .unwrap_or_else(|| DeviceHandle::new(address.clone()));
                            if shared
                                .try_transition(None, ConnectionState::Connected(handle.clone()))
                            {
                                shared.publish_event(SessionEvent::Connected(handle));
                            }
                        }
                    }
                }
                Ok(LinkEvent::Down { address }) => {
                    shared.mark_link(&address, false);
                    if let ConnectionState::Connected(current) = shared.state.get() {
                        if current.address == address {
                            log::info!("session: link to {} lost", current.label());
                            // Cancel any in-flight discovery as well.
                            shared.generation.fetch_add(1, Ordering::SeqCst);
                            shared.try_transition(None, ConnectionState::NoKnownDevice);
                            shared.publish_event(SessionEvent::Disconnected);
                        }
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => {
                    log::debug!("session: link feed closed, watcher exiting");
                    break;
                }
            }
        }
    }
}

impl Drop for ConnectionSessionManager {
    fn drop(&mut self) {
        self.watcher_shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
    }
}

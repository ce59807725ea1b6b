//! Single-writer observable value holder
//!
//! Each piece of observable state (connection state, active transmission
//! intent, settings maps) is owned by exactly one component, which holds the
//! [`StateCell`] and hands out cheap [`StateReader`] clones. Readers can poll
//! the current value or subscribe to a change feed.

use std::sync::{Arc, Mutex, RwLock};

struct Shared<T> {
    value: RwLock<T>,
    subscribers: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone> Shared<T> {
    fn get(&self) -> T {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }
}

/// Writer half. Not cloneable: the single writer lives inside the owning
/// component.
pub struct StateCell<T> {
    shared: Arc<Shared<T>>,
}

/// Reader half. Cloneable and shareable across threads.
pub struct StateReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> StateCell<T> {
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: RwLock::new(initial),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Replace the value and notify all live subscribers. Subscribers whose
    /// receiver was dropped are pruned here.
    pub fn set(&self, value: T) {
        match self.shared.value.write() {
            Ok(mut guard) => *guard = value.clone(),
            Err(poisoned) => *poisoned.into_inner() = value.clone(),
        }
        if let Ok(mut subs) = self.shared.subscribers.lock() {
            subs.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }

    /// Hand out a reader.
    pub fn reader(&self) -> StateReader<T> {
        StateReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> StateReader<T> {
    /// Current value.
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Subscribe to the change feed. Every `set` after this call delivers one
    /// value, in write order.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        self.shared.subscribe()
    }
}

impl<T> Clone for StateReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

//! Bookkeeping of open listeners and multiplexed connections.
//!
//! Every tracked resource is removed exactly once: either its owning loop
//! untracks it when it ends, or [`ConnectionRegistry::close_all`] sweeps it.
//! Whoever removes an entry is responsible for closing it, so a resource is
//! never closed by both sides.
//!
//! Once `close_all` ran the registry refuses new entries; callers get `None`
//! back and must close the resource themselves.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::Close;
use crate::error::ignore_already_closed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct TrackedListener {
    handle: Arc<dyn Close>,
    addr: Option<SocketAddr>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    shut_down: bool,
    listeners: HashMap<ListenerId, TrackedListener>,
    connections: HashMap<ConnectionId, Arc<dyn Close>>,
}

impl RegistryState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // closing never happens under the lock, so a poisoned state is still consistent
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track_listener(&self, listener: Arc<dyn Close>, addr: Option<SocketAddr>) -> Option<ListenerId> {
        let mut state = self.state();
        if state.shut_down {
            return None;
        }
        let id = ListenerId(state.next_id());
        state.listeners.insert(id, TrackedListener { handle: listener, addr });
        Some(id)
    }

    pub fn untrack_listener(&self, id: ListenerId) -> Option<Arc<dyn Close>> {
        self.state().listeners.remove(&id).map(|tracked| tracked.handle)
    }

    pub fn track_connection(&self, connection: Arc<dyn Close>) -> Option<ConnectionId> {
        let mut state = self.state();
        if state.shut_down {
            return None;
        }
        let id = ConnectionId(state.next_id());
        state.connections.insert(id, connection);
        Some(id)
    }

    pub fn untrack_connection(&self, id: ConnectionId) -> Option<Arc<dyn Close>> {
        self.state().connections.remove(&id)
    }

    /// Closes every tracked listener, then every tracked connection.
    pub fn close_all(&self) {
        let (listeners, connections) = {
            let mut state = self.state();
            state.shut_down = true;
            (std::mem::take(&mut state.listeners), std::mem::take(&mut state.connections))
        };

        for tracked in listeners.into_values() {
            ignore_already_closed(tracked.handle.close());
        }
        for connection in connections.into_values() {
            ignore_already_closed(connection.close());
        }
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.state().listeners.values().filter_map(|tracked| tracked.addr).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }
}

impl Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ConnectionRegistry")
            .field("shut_down", &state.shut_down)
            .field("listeners", &state.listeners.len())
            .field("connections", &state.connections.len())
            .finish()
    }
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::debug;

pub type ConnectionId = u64;

/// Where a connection is in its lifecycle. A fully closed connection is
/// removed from the registry rather than kept in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Handshake accepted, backend not yet running.
    Connecting,
    /// Bridging messages in both directions.
    Active,
    /// Tearing down the backend and closing the socket.
    Closing,
}

/// Point-in-time view of a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub backend_pid: Option<u32>,
    pub phase: ConnectionPhase,
}

struct Entry {
    peer: SocketAddr,
    backend_pid: Option<u32>,
    phase: ConnectionPhase,
    shutdown: watch::Sender<bool>,
}

/// Explicit mapping from connection id to the backend process it owns.
///
/// Every accepted connection registers here, so shutdown can iterate the
/// live set instead of relying on whatever the transport tracks internally.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: ConnectionId,
    entries: HashMap<ConnectionId, Entry>,
}

/// Thread-safe shared handle to the registry.
pub type SharedRegistry = Arc<RwLock<ConnectionRegistry>>;

pub fn new_shared() -> SharedRegistry {
    Arc::new(RwLock::new(ConnectionRegistry::default()))
}

impl ConnectionRegistry {
    /// Registers a new connection and returns its id together with the
    /// shutdown signal its loop must watch.
    pub fn insert(&mut self, peer: SocketAddr) -> (ConnectionId, watch::Receiver<bool>) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = watch::channel(false);
        self.entries.insert(
            id,
            Entry {
                peer,
                backend_pid: None,
                phase: ConnectionPhase::Connecting,
                shutdown: tx,
            },
        );
        debug!("Registered connection {} from {}", id, peer);
        (id, rx)
    }

    /// Records the pid of the backend this connection spawned.
    pub fn set_backend(&mut self, id: ConnectionId, pid: Option<u32>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.backend_pid = pid;
        }
    }

    pub fn set_phase(&mut self, id: ConnectionId, phase: ConnectionPhase) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.phase = phase;
        }
    }

    /// Removes a connection that has fully closed.
    pub fn remove(&mut self, id: ConnectionId) {
        if self.entries.remove(&id).is_some() {
            debug!("Unregistered connection {}", id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every live connection, ordered by id.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .entries
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                peer: entry.peer,
                backend_pid: entry.backend_pid,
                phase: entry.phase,
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Signals every live connection to tear down its backend and close.
    pub fn drain(&mut self) {
        for (id, entry) in &self.entries {
            debug!("Signalling connection {} to shut down", id);
            let _ = entry.shutdown.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    #[test]
    fn insert_assigns_unique_ids_in_connecting_phase() {
        let mut registry = ConnectionRegistry::default();
        let (a, _rx_a) = registry.insert(peer());
        let (b, _rx_b) = registry.insert(peer());

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(
            registry
                .snapshot()
                .iter()
                .all(|info| info.phase == ConnectionPhase::Connecting)
        );
    }

    #[test]
    fn phase_and_backend_updates_show_in_snapshot() {
        let mut registry = ConnectionRegistry::default();
        let (id, _rx) = registry.insert(peer());

        registry.set_backend(id, Some(4242));
        registry.set_phase(id, ConnectionPhase::Active);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].backend_pid, Some(4242));
        assert_eq!(snapshot[0].phase, ConnectionPhase::Active);
    }

    #[test]
    fn remove_forgets_the_connection() {
        let mut registry = ConnectionRegistry::default();
        let (id, _rx) = registry.insert(peer());

        registry.remove(id);
        assert!(registry.is_empty());

        // Removing twice is harmless.
        registry.remove(id);
    }

    #[test]
    fn drain_signals_every_connection() {
        let mut registry = ConnectionRegistry::default();
        let (_a, rx_a) = registry.insert(peer());
        let (_b, rx_b) = registry.insert(peer());

        registry.drain();

        assert!(*rx_a.borrow());
        assert!(*rx_b.borrow());
    }
}

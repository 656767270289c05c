//! Session registry (C2): team -> connections map.
//!
//! All operations are synchronous and serializable behind a single lock;
//! callers never hold this lock while performing I/O (§4.2, §5) — a
//! `register`/`lookup` returns owned handles, and the actual socket write
//! happens after the lock is dropped (see `broadcaster`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Default cap on concurrent sessions per team (§3, §6.5).
pub const DEFAULT_SESSION_CAP: usize = 5;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub type ConnId = u64;

/// A handle the registry holds for one connection. The outbound half of the
/// connection's writer task; sending here is fire-and-forget from the
/// registry's point of view.
#[derive(Clone)]
pub struct ConnHandle {
    pub id: ConnId,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnHandle {
    pub fn new(id: ConnId, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Enqueue a message for delivery on this connection. Returns `false` if
    /// the connection's writer has already gone away (dead connection).
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.sender.send(msg).is_ok()
    }
}

pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
struct Inner {
    by_team: HashMap<String, Vec<ConnHandle>>,
    conn_to_team: HashMap<ConnId, String>,
    /// Admin-observer connections: not a trading team, not subject to the
    /// per-team session cap, fanned out to separately by the broadcaster
    /// (§4.7, §8 testable property 7: "the admin observer").
    observers: Vec<ConnHandle>,
}

/// Team -> connections registry. One process-wide instance (§9: "the engine
/// and registry are singletons by convention, injected into collaborators").
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
    session_cap: usize,
}

/// Outcome of `register`: whether an existing connection had to be evicted
/// to make room under the per-team session cap.
pub struct RegisterOutcome {
    pub evicted: Option<ConnId>,
}

impl SessionRegistry {
    pub fn new(session_cap: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            session_cap: session_cap.max(1),
        }
    }

    /// Register a connection under `team_name`, evicting the oldest session
    /// of that team if the cap would otherwise be exceeded (§3, §4.10).
    pub fn register(&self, team_name: &str, handle: ConnHandle) -> RegisterOutcome {
        let mut inner = self.inner.write();
        inner.conn_to_team.insert(handle.id, team_name.to_string());
        let conns = inner.by_team.entry(team_name.to_string()).or_default();
        let mut evicted = None;
        if conns.len() >= self.session_cap {
            let oldest = conns.remove(0);
            inner.conn_to_team.remove(&oldest.id);
            evicted = Some(oldest.id);
        }
        inner.by_team.entry(team_name.to_string()).or_default().push(handle);
        RegisterOutcome { evicted }
    }

    /// Register an admin-observer connection. Observers aren't a trading
    /// team, don't go through `register`'s per-team cap/eviction, and are
    /// never returned by `connections_for`/`all_connections` — only the
    /// broadcaster's `send_to_observers` fan-out reaches them.
    pub fn register_observer(&self, handle: ConnHandle) {
        self.inner.write().observers.push(handle);
    }

    /// Remove one connection (e.g. on close or eviction). Checks both the
    /// per-team map and the observer list, since a connection is one or the
    /// other, never both.
    pub fn unregister(&self, conn_id: ConnId) {
        let mut inner = self.inner.write();
        if let Some(team) = inner.conn_to_team.remove(&conn_id) {
            if let Some(conns) = inner.by_team.get_mut(&team) {
                conns.retain(|c| c.id != conn_id);
                if conns.is_empty() {
                    inner.by_team.remove(&team);
                }
            }
            return;
        }
        inner.observers.retain(|c| c.id != conn_id);
    }

    /// Remove every connection for a team (used on fatal auth failure paths
    /// that close every session at once, if ever needed).
    pub fn unregister_all(&self, team_name: &str) {
        let mut inner = self.inner.write();
        if let Some(conns) = inner.by_team.remove(team_name) {
            for c in conns {
                inner.conn_to_team.remove(&c.id);
            }
        }
    }

    pub fn connections_for(&self, team_name: &str) -> Vec<ConnHandle> {
        self.inner
            .read()
            .by_team
            .get(team_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_connections(&self) -> Vec<ConnHandle> {
        self.inner
            .read()
            .by_team
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn observer_connections(&self) -> Vec<ConnHandle> {
        self.inner.read().observers.clone()
    }

    pub fn team_of(&self, conn_id: ConnId) -> Option<String> {
        self.inner.read().conn_to_team.get(&conn_id).cloned()
    }

    pub fn connected_team_count(&self) -> usize {
        self.inner.read().by_team.len()
    }

    pub fn total_connection_count(&self) -> usize {
        self.inner.read().conn_to_team.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: ConnId) -> ConnHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnHandle::new(id, tx)
    }

    #[test]
    fn register_and_lookup_roundtrip() {
        let registry = SessionRegistry::new(5);
        registry.register("A", handle(1));
        assert_eq!(registry.connections_for("A").len(), 1);
        assert_eq!(registry.team_of(1), Some("A".to_string()));
    }

    #[test]
    fn cap_overflow_evicts_oldest() {
        let registry = SessionRegistry::new(2);
        registry.register("A", handle(1));
        registry.register("A", handle(2));
        let outcome = registry.register("A", handle(3));
        assert_eq!(outcome.evicted, Some(1));
        let remaining: Vec<ConnId> = registry.connections_for("A").iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn unregister_removes_connection_only() {
        let registry = SessionRegistry::new(5);
        registry.register("A", handle(1));
        registry.register("A", handle(2));
        registry.unregister(1);
        assert_eq!(registry.connections_for("A").len(), 1);
        assert_eq!(registry.team_of(1), None);
    }

    #[test]
    fn observers_are_separate_from_team_connections() {
        let registry = SessionRegistry::new(5);
        registry.register("A", handle(1));
        registry.register_observer(handle(2));
        assert_eq!(registry.observer_connections().len(), 1);
        assert!(registry.all_connections().iter().all(|c| c.id != 2));
        assert_eq!(registry.team_of(2), None);
    }

    #[test]
    fn unregister_removes_an_observer_too() {
        let registry = SessionRegistry::new(5);
        registry.register_observer(handle(9));
        registry.unregister(9);
        assert!(registry.observer_connections().is_empty());
    }
}

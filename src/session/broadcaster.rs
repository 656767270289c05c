//! Broadcaster (C3): targeted unicast and global broadcast over the registry.
//!
//! `send`/`broadcast` never hold the registry lock while writing to a
//! socket — connection handles are cloned out under the lock, then written
//! to afterward (§4.2, §5). A send failure marks the connection dead and
//! asynchronously unregisters it; other sessions of the same team are
//! unaffected (§4.3).

use std::sync::Arc;

use tracing::warn;

use crate::protocol::ServerMessage;

use super::registry::SessionRegistry;

pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Unicast to every session currently registered for `team_name`.
    /// Returns `true` if the registry had at least one session to deliver
    /// to — delivery to the network itself is not guaranteed (§4.3).
    pub fn send(&self, team_name: &str, msg: ServerMessage) -> bool {
        let conns = self.registry.connections_for(team_name);
        if conns.is_empty() {
            return false;
        }
        for conn in conns {
            if !conn.send(msg.clone()) {
                warn!(conn_id = conn.id, team = team_name, "dead connection, unregistering");
                self.registry.unregister(conn.id);
            }
        }
        true
    }

    /// Broadcast to every registered session, regardless of team.
    pub fn broadcast(&self, msg: ServerMessage) {
        for conn in self.registry.all_connections() {
            if !conn.send(msg.clone()) {
                warn!(conn_id = conn.id, "dead connection, unregistering");
                self.registry.unregister(conn.id);
            }
        }
    }

    /// Fan out to every registered admin-observer connection, distinct from
    /// both `send` (one team) and `broadcast` (every trading session) — this
    /// is the "admin observer" delivery target §4.7/§8 require for every
    /// FILL (`MarketEngine::emit_fill_events`'s `ADMIN_FILL`).
    pub fn send_to_observers(&self, msg: ServerMessage) {
        for conn in self.registry.observer_connections() {
            if !conn.send(msg.clone()) {
                warn!(conn_id = conn.id, "dead observer connection, unregistering");
                self.registry.unregister(conn.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::ConnHandle;
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn registry_with_conn(team: &str) -> (Arc<SessionRegistry>, mpsc::UnboundedReceiver<ServerMessage>) {
        let registry = Arc::new(SessionRegistry::new(5));
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(team, ConnHandle::new(super::super::registry::next_conn_id(), tx));
        (registry, rx)
    }

    #[test]
    fn send_reaches_only_the_named_team() {
        let (registry, mut rx_a) = registry_with_conn("A");
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("B", ConnHandle::new(super::super::registry::next_conn_id(), tx_b));

        let broadcaster = Broadcaster::new(registry);
        let delivered = broadcaster.send("A", ServerMessage::Pong {});
        assert!(delivered);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_team_returns_false() {
        let registry = Arc::new(SessionRegistry::new(5));
        let broadcaster = Broadcaster::new(registry);
        assert!(!broadcaster.send("NOBODY", ServerMessage::Pong {}));
    }

    #[test]
    fn dead_connection_is_reaped_on_send_failure() {
        let registry = Arc::new(SessionRegistry::new(5));
        let (tx, rx) = mpsc::unbounded_channel();
        let id = super::super::registry::next_conn_id();
        registry.register("A", ConnHandle::new(id, tx));
        drop(rx); // receiver gone => send() will fail

        let broadcaster = Broadcaster::new(registry.clone());
        broadcaster.send(
            "A",
            ServerMessage::BroadcastNotification {
                message: "hi".into(),
                sender: "admin".into(),
                server_time: Utc::now(),
            },
        );
        assert_eq!(registry.connections_for("A").len(), 0);
    }

    #[test]
    fn send_to_observers_reaches_observer_not_team() {
        let (registry, mut rx_a) = registry_with_conn("A");
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        registry.register_observer(ConnHandle::new(super::super::registry::next_conn_id(), obs_tx));

        let broadcaster = Broadcaster::new(registry);
        broadcaster.send_to_observers(ServerMessage::Pong {});
        assert!(obs_rx.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }
}

//! Shared fixtures for integration tests: team builders and an engine
//! harness wired exactly like `main.rs`, minus the axum router.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stellar_exchange::engine::{EngineConfig, MarketEngine};
use stellar_exchange::metrics::Metrics;
use stellar_exchange::protocol::{Product, Recipe, Role, ServerMessage};
use stellar_exchange::session::{Broadcaster, ConnHandle, SessionRegistry};
use stellar_exchange::team::{Team, TeamStore};
use tokio::sync::mpsc;

pub fn team(name: &str, balance: f64, inventory: &[(&str, u64)], authorized: &[&str]) -> Team {
    Team {
        team_name: name.into(),
        token: format!("TK-{name}"),
        species: "human".into(),
        initial_balance: balance,
        current_balance: balance,
        inventory: inventory.iter().map(|(p, q)| (Product::new(*p), *q)).collect(),
        authorized_products: authorized.iter().map(|p| Product::new(*p)).collect::<HashSet<_>>(),
        recipes: HashMap::<Product, Recipe>::new(),
        role: Role {
            branches: 1,
            max_depth: 1,
            decay: 0.0,
            base_energy: 0.0,
            level_energy: 0.0,
        },
    }
}

/// An engine plus the collaborators it needs, with a registered mailbox per
/// team so a test can observe exactly what each team was sent.
pub struct Harness {
    pub engine: Arc<MarketEngine>,
    pub teams: Arc<TeamStore>,
    pub registry: Arc<SessionRegistry>,
    pub inboxes: HashMap<String, mpsc::UnboundedReceiver<ServerMessage>>,
}

impl Harness {
    pub fn new(roster: Vec<Team>) -> Self {
        let names: Vec<String> = roster.iter().map(|t| t.team_name.clone()).collect();
        let teams = Arc::new(TeamStore::new(roster));
        let registry = Arc::new(SessionRegistry::new(5));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let metrics = Arc::new(Metrics::new());
        let engine = MarketEngine::spawn(teams.clone(), broadcaster, metrics, EngineConfig::default());

        static NEXT_TEST_CONN_ID: AtomicU64 = AtomicU64::new(1);

        let mut inboxes = HashMap::new();
        for name in names {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.register(&name, ConnHandle::new(NEXT_TEST_CONN_ID.fetch_add(1, Ordering::Relaxed), tx));
            inboxes.insert(name, rx);
        }
        Self {
            engine,
            teams,
            registry,
            inboxes,
        }
    }

    /// Drain the next message sent to `team_name`, failing the test if none
    /// arrives within a generous bound (the engine worker runs on another
    /// task, so every assertion here is necessarily across an await point).
    pub async fn recv(&mut self, team_name: &str) -> ServerMessage {
        tokio::time::timeout(
            Duration::from_secs(2),
            self.inboxes.get_mut(team_name).expect("no inbox registered for team").recv(),
        )
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for a message to {team_name}"))
        .unwrap_or_else(|| panic!("inbox for {team_name} closed unexpectedly"))
    }

    pub fn try_recv(&mut self, team_name: &str) -> Option<ServerMessage> {
        self.inboxes.get_mut(team_name).expect("no inbox registered for team").try_recv().ok()
    }
}

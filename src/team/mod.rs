//! Team store (C14): the data-model backing for settlement and session login.
//!
//! Teams are seeded out-of-band (a static fixture in this deployment) and
//! mutated only by settlement (`engine::settlement`) and production updates
//! (`session::manager`). No database is wired here — `TeamStore` is the seam
//! a persistent store would attach to; persistence choice is out of scope.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::protocol::{Product, Recipe, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    pub token: String,
    pub species: String,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub inventory: HashMap<Product, u64>,
    pub authorized_products: HashSet<Product>,
    pub recipes: HashMap<Product, Recipe>,
    pub role: Role,
}

impl Team {
    pub fn inventory_of(&self, product: &Product) -> u64 {
        self.inventory.get(product).copied().unwrap_or(0)
    }
}

/// In-memory team table, `team_name` and `token` both unique.
pub struct TeamStore {
    by_name: RwLock<HashMap<String, Team>>,
    token_to_name: RwLock<HashMap<String, String>>,
}

impl TeamStore {
    pub fn new(teams: Vec<Team>) -> Self {
        let mut by_name = HashMap::with_capacity(teams.len());
        let mut token_to_name = HashMap::with_capacity(teams.len());
        for team in teams {
            token_to_name.insert(team.token.clone(), team.team_name.clone());
            by_name.insert(team.team_name.clone(), team);
        }
        Self {
            by_name: RwLock::new(by_name),
            token_to_name: RwLock::new(token_to_name),
        }
    }

    pub fn lookup_by_token(&self, token: &str) -> Option<Team> {
        let name = self.token_to_name.read().get(token).cloned()?;
        self.by_name.read().get(&name).cloned()
    }

    pub fn snapshot(&self, team_name: &str) -> Option<Team> {
        self.by_name.read().get(team_name).cloned()
    }

    pub fn all_team_names(&self) -> Vec<String> {
        self.by_name.read().keys().cloned().collect()
    }

    /// Eligible responders for a secondary offer: every team holding at least
    /// `min_qty` of `product`, excluding `exclude`.
    pub fn teams_holding(&self, product: &Product, min_qty: u64, exclude: &str) -> Vec<String> {
        self.by_name
            .read()
            .values()
            .filter(|t| t.team_name != exclude && t.inventory_of(product) >= min_qty)
            .map(|t| t.team_name.clone())
            .collect()
    }

    /// Apply a mutation under the table's write lock; `f` returns `Ok` to commit
    /// or `Err` to leave the team untouched (used by settlement's precondition
    /// re-check and by production updates).
    pub fn mutate<F, T, E>(&self, team_name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Team) -> Result<T, E>,
    {
        let mut guard = self.by_name.write();
        let team = guard.get_mut(team_name).expect("team must exist to be mutated");
        f(team)
    }
}

/// Load the team roster from a JSON fixture (array of `Team`). Teams are
/// created out-of-band (§3) — this is the seam a real provisioning system
/// would replace.
pub fn load_teams_from_file(path: &str) -> anyhow::Result<Vec<Team>> {
    let raw = std::fs::read_to_string(path)?;
    let teams: Vec<Team> = serde_json::from_str(&raw)?;
    Ok(teams)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_team(name: &str, token: &str) -> Team {
        Team {
            team_name: name.into(),
            token: token.into(),
            species: "human".into(),
            initial_balance: 1000.0,
            current_balance: 1000.0,
            inventory: HashMap::new(),
            authorized_products: HashSet::new(),
            recipes: HashMap::new(),
            role: Role {
                branches: 1,
                max_depth: 1,
                decay: 0.0,
                base_energy: 0.0,
                level_energy: 0.0,
            },
        }
    }

    #[test]
    fn lookup_by_token_resolves_team() {
        let store = TeamStore::new(vec![sample_team("A", "TK-a")]);
        let team = store.lookup_by_token("TK-a").unwrap();
        assert_eq!(team.team_name, "A");
    }

    #[test]
    fn unknown_token_returns_none() {
        let store = TeamStore::new(vec![sample_team("A", "TK-a")]);
        assert!(store.lookup_by_token("TK-nope").is_none());
    }

    #[test]
    fn teams_holding_excludes_buyer_and_underfunded() {
        let mut b = sample_team("B", "TK-b");
        b.inventory.insert(Product::new("PITA"), 12);
        let mut a = sample_team("A", "TK-a");
        a.inventory.insert(Product::new("PITA"), 2);
        let store = TeamStore::new(vec![a, b]);
        let eligible = store.teams_holding(&Product::new("PITA"), 10, "A");
        assert_eq!(eligible, vec!["B".to_string()]);
    }

    #[test]
    fn load_teams_from_file_reads_json_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(
            &path,
            serde_json::to_string(&vec![sample_team("A", "TK-a"), sample_team("B", "TK-b")]).unwrap(),
        )
        .unwrap();

        let teams = load_teams_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(teams.len(), 2);
        assert!(teams.iter().any(|t| t.team_name == "A"));
        assert!(teams.iter().any(|t| t.team_name == "B"));
    }

    #[test]
    fn load_teams_from_file_missing_path_errors() {
        let result = load_teams_from_file("/nonexistent/path/roster.json");
        assert!(result.is_err());
    }
}

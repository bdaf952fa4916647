use crate::domain::{DataObject, LobbyId, LobbySummary, Player, PlayerId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Default maximum lobby size
pub const DEFAULT_MAX_PLAYERS: usize = 3;

/// Locally cached snapshot of a directory-hosted lobby
///
/// The directory owns the lobby. Peers hold a copy that is advanced
/// either by applying a [`LobbyChange`](crate::LobbyChange) with the next
/// version or by replacing it with a freshly fetched snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Lobby {
    /// Unique lobby identifier
    id: LobbyId,

    /// Human readable lobby name
    name: String,

    /// Short code players can type to join
    lobby_code: String,

    /// Current host's player ID
    host_id: PlayerId,

    /// Directory version, bumped on every mutation
    version: u64,

    /// Members in join order
    players: Vec<Player>,

    /// Shared metadata bag
    #[serde(default)]
    data: HashMap<String, DataObject>,

    is_private: bool,
    is_locked: bool,
    max_players: usize,
}

/// Errors raised when a lobby snapshot breaks its invariants
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Lobby {0} has no host among its players")]
    MissingHost(LobbyId),

    #[error("Player {0} appears more than once")]
    DuplicatePlayer(PlayerId),

    #[error("Invalid lookup state: {0}")]
    InvalidLookupState(String),
}

impl Lobby {
    /// Create a lobby at version 1 with `host` as its only member
    pub fn new(
        id: LobbyId,
        name: impl Into<String>,
        lobby_code: impl Into<String>,
        host: Player,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            lobby_code: lobby_code.into(),
            host_id: host.id().clone(),
            version: 1,
            players: vec![host],
            data: HashMap::new(),
            is_private: false,
            is_locked: false,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, DataObject>) -> Self {
        self.data = data;
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players.max(1);
        self
    }

    // ===== Getters =====

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lobby_code(&self) -> &str {
        &self.lobby_code
    }

    pub fn host_id(&self) -> &PlayerId {
        &self.host_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == player_id)
    }

    pub fn host(&self) -> Option<&Player> {
        self.player(&self.host_id)
    }

    pub fn is_host(&self, player_id: &PlayerId) -> bool {
        &self.host_id == player_id
    }

    pub fn data(&self) -> &HashMap<String, DataObject> {
        &self.data
    }

    /// Lobby metadata value stored under `key`
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|d| d.value.as_str())
    }

    /// Player metadata value stored under `key`
    pub fn player_data_value(&self, player_id: &PlayerId, key: &str) -> Option<&str> {
        self.player(player_id).and_then(|p| p.data_value(key))
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Players present in `self` but not in `other`
    pub fn players_missing_from(&self, other: &Lobby) -> Vec<Player> {
        self.players
            .iter()
            .filter(|p| other.player(p.id()).is_none())
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            lobby_code: self.lobby_code.clone(),
            player_count: self.players.len(),
            max_players: self.max_players,
            is_locked: self.is_locked,
        }
    }

    /// Check the structural invariants of the snapshot
    ///
    /// Exactly one player must carry the host id and player ids are unique.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for player in &self.players {
            if !seen.insert(player.id()) {
                return Err(CoreError::DuplicatePlayer(player.id().clone()));
            }
        }

        if !seen.contains(&self.host_id) {
            return Err(CoreError::MissingHost(self.id.clone()));
        }

        Ok(())
    }

    // ===== Mutation (driven by LobbyChange) =====

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn set_host(&mut self, host_id: PlayerId) {
        self.host_id = host_id;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_private(&mut self, is_private: bool) {
        self.is_private = is_private;
    }

    pub(crate) fn set_locked(&mut self, is_locked: bool) {
        self.is_locked = is_locked;
    }

    pub(crate) fn upsert_player(&mut self, player: Player) {
        match self.players.iter_mut().find(|p| p.id() == player.id()) {
            Some(existing) => *existing = player,
            None => self.players.push(player),
        }
    }

    pub(crate) fn remove_player(&mut self, player_id: &PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id() == player_id)?;
        Some(self.players.remove(index))
    }

    pub(crate) fn player_mut(&mut self, player_id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == player_id)
    }

    pub(crate) fn set_data(&mut self, key: &str, data: Option<DataObject>) {
        match data {
            Some(data) => {
                self.data.insert(key.to_string(), data);
            }
            None => {
                self.data.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str) -> Player {
        Player::new(PlayerId::new(id))
    }

    fn test_lobby() -> Lobby {
        Lobby::new(LobbyId::new("l1"), "Test Lobby", "ABC123", player("host"))
    }

    #[test]
    fn test_new_lobby_seeds_host() {
        let lobby = test_lobby();

        assert_eq!(lobby.version(), 1);
        assert_eq!(lobby.players().len(), 1);
        assert!(lobby.is_host(&PlayerId::new("host")));
        assert!(lobby.host().is_some());
        assert!(lobby.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_host() {
        let mut lobby = test_lobby();
        lobby.set_host(PlayerId::new("ghost"));

        assert_eq!(
            lobby.validate(),
            Err(CoreError::MissingHost(LobbyId::new("l1")))
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_players() {
        let mut lobby = test_lobby();
        lobby.players.push(player("host"));

        assert_eq!(
            lobby.validate(),
            Err(CoreError::DuplicatePlayer(PlayerId::new("host")))
        );
    }

    #[test]
    fn test_upsert_player_is_idempotent() {
        let mut lobby = test_lobby();
        lobby.upsert_player(player("guest"));
        lobby.upsert_player(player("guest"));

        assert_eq!(lobby.players().len(), 2);
    }

    #[test]
    fn test_players_missing_from() {
        let before = {
            let mut l = test_lobby();
            l.upsert_player(player("guest"));
            l
        };
        let after = test_lobby();

        let gone = before.players_missing_from(&after);
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].id(), &PlayerId::new("guest"));
    }

    #[test]
    fn test_is_full_respects_max_players() {
        let mut lobby = test_lobby().with_max_players(2);
        assert!(!lobby.is_full());

        lobby.upsert_player(player("guest"));
        assert!(lobby.is_full());
    }
}

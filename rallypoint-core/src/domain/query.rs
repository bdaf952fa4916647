use crate::domain::{Lobby, LobbyId};
use serde::{Deserialize, Serialize};

/// Filter for browsing public lobbies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyQuery {
    /// Only lobbies with a free slot
    pub only_open: bool,
    pub include_locked: bool,
    pub limit: usize,
}

impl Default for LobbyQuery {
    fn default() -> Self {
        Self {
            only_open: true,
            include_locked: false,
            limit: 25,
        }
    }
}

impl LobbyQuery {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_locked(mut self, include_locked: bool) -> Self {
        self.include_locked = include_locked;
        self
    }

    /// Private lobbies never match a query
    pub fn matches(&self, lobby: &Lobby) -> bool {
        if lobby.is_private() {
            return false;
        }
        if lobby.is_locked() && !self.include_locked {
            return false;
        }
        !(self.only_open && lobby.is_full())
    }
}

/// Browse-list entry for a lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySummary {
    pub id: LobbyId,
    pub name: String,
    pub lobby_code: String,
    pub player_count: usize,
    pub max_players: usize,
    pub is_locked: bool,
}

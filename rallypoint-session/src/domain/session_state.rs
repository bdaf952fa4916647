use rallypoint_core::{Lobby, LobbyId, PlayerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Local peer's relationship to a lobby
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    /// No lobby joined
    #[default]
    Idle,
    /// A create/join request is in flight
    Connecting,
    /// Local peer owns the lobby
    Hosting,
    /// Local peer is a non-host member
    Joined,
}

impl SessionRole {
    pub fn in_lobby(&self) -> bool {
        matches!(self, SessionRole::Hosting | SessionRole::Joined)
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Idle => write!(f, "Idle"),
            SessionRole::Connecting => write!(f, "Connecting"),
            SessionRole::Hosting => write!(f, "Hosting"),
            SessionRole::Joined => write!(f, "Joined"),
        }
    }
}

/// Why the local peer is no longer in a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// Local request (leave or stop hosting)
    Requested,
    /// The directory deleted the lobby
    Deleted,
    /// Immediate teardown at shutdown
    Shutdown,
}

/// Mutable session bookkeeping guarded by the coordinator
#[derive(Debug, Default)]
pub struct SessionState {
    pub role: SessionRole,
    pub lobby: Option<Lobby>,
}

impl SessionState {
    pub fn lobby_id(&self) -> Option<&LobbyId> {
        self.lobby.as_ref().map(|l| l.id())
    }

    /// Whether the cached lobby names `player_id` as host
    pub fn is_host(&self, player_id: &PlayerId) -> bool {
        self.lobby.as_ref().is_some_and(|l| l.is_host(player_id))
    }

    /// Drop the lobby and return to `Idle`, yielding what was held
    pub fn clear(&mut self) -> (SessionRole, Option<Lobby>) {
        let role = std::mem::take(&mut self.role);
        (role, self.lobby.take())
    }
}

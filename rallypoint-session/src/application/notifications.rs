use crate::domain::LeaveReason;
use rallypoint_core::{Lobby, LobbyId, LobbySummary, Player, SubscriptionState};

/// Lobby lifecycle notifications published by the coordinator
#[derive(Debug, Clone)]
pub enum LobbyNotification {
    /// Local peer became host, either by creating the lobby or by migration
    Hosted { lobby: Lobby, migrated: bool },

    /// Local peer stopped being host but is still a member
    HostEnded { lobby_id: LobbyId },

    Joined(Lobby),

    /// Snapshot changed (delta applied, re-fetched or player data edited)
    Updated(Lobby),

    Left { lobby_id: LobbyId, reason: LeaveReason },

    /// Removed by the host (or the directory); no directory call was made
    Kicked { lobby_id: LobbyId },

    /// Another member disappeared from the snapshot
    PlayerLeft { lobby_id: LobbyId, player: Player },

    LobbiesLoaded(Vec<LobbySummary>),

    EventConnectionChanged(SubscriptionState),
}

impl LobbyNotification {
    /// Lobby carried by the notification, if any
    pub fn lobby(&self) -> Option<&Lobby> {
        match self {
            LobbyNotification::Hosted { lobby, .. } => Some(lobby),
            LobbyNotification::Joined(lobby) | LobbyNotification::Updated(lobby) => Some(lobby),
            _ => None,
        }
    }
}

/// Relay readiness signals consumed by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayNotification {
    /// A new relay session id showed up in lobby metadata
    SessionIdReceived(String),

    /// The local endpoint is authorized on the relay
    ClientReadyToConnect { session_id: String },

    /// Authorization did not show up within the budget
    ClientAuthorizationFailed { session_id: String },
}

use crate::domain::{LobbyChange, PlayerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the directory's push subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Unknown,
    Subscribing,
    Subscribed,
    /// Connection dropped; events may have been missed
    Unsynced,
    Error,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Unknown => write!(f, "Unknown"),
            SubscriptionState::Subscribing => write!(f, "Subscribing"),
            SubscriptionState::Subscribed => write!(f, "Subscribed"),
            SubscriptionState::Unsynced => write!(f, "Unsynced"),
            SubscriptionState::Error => write!(f, "Error"),
        }
    }
}

/// Events delivered by the directory for one subscribed lobby, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyEvent {
    /// Lobby mutated (or was deleted)
    LobbyChanged(LobbyChange),

    /// A player published new metadata keys
    PlayerDataAdded { player_id: PlayerId, keys: Vec<String> },

    /// A player changed existing metadata keys
    PlayerDataChanged { player_id: PlayerId, keys: Vec<String> },

    /// The local player was removed by someone else
    KickedFromLobby,

    ConnectionStateChanged(SubscriptionState),
}

impl LobbyEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            LobbyEvent::LobbyChanged(change) if change.lobby_deleted => "LobbyDeleted",
            LobbyEvent::LobbyChanged(_) => "LobbyChanged",
            LobbyEvent::PlayerDataAdded { .. } => "PlayerDataAdded",
            LobbyEvent::PlayerDataChanged { .. } => "PlayerDataChanged",
            LobbyEvent::KickedFromLobby => "KickedFromLobby",
            LobbyEvent::ConnectionStateChanged(_) => "ConnectionStateChanged",
        }
    }
}

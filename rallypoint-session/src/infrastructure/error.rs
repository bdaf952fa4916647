use crate::application::config::ConfigError;
use rallypoint_core::{CoreError, LobbyId, PlayerId};

/// Failures reported by a lobby directory
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Lobby not found: {0}")]
    LobbyNotFound(LobbyId),

    #[error("Player {player} is not in lobby {lobby}")]
    PlayerNotFound { lobby: LobbyId, player: PlayerId },

    #[error("Lobby {0} is full")]
    LobbyFull(LobbyId),

    #[error("Lobby {0} is locked")]
    LobbyLocked(LobbyId),

    #[error("No lobby matches the quick join filter")]
    NoOpenLobby,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited by the directory")]
    RateLimited,

    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by the relay service
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Relay session not found: {0}")]
    SessionNotFound(String),

    #[error("Relay session {0} did not become ready in time")]
    SessionNotReady(String),

    #[error("Relay request failed: {0}")]
    RequestFailed(String),
}

/// Failures reported by public IP discovery
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum IpLookupError {
    #[error("Public IP unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the session coordinators
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Already hosting or joined a lobby")]
    AlreadyInLobby,

    #[error("Not in a lobby")]
    NotInLobby,

    #[error("Only the lobby host can do this")]
    NotHost,

    #[error("Local player id is missing")]
    MissingLocalPlayerId,

    #[error("Local player {0} is not part of the lobby")]
    LocalPlayerMissing(PlayerId),

    #[error("No relay session is active")]
    NoRelaySession,

    #[error("Timed out collecting public IPs ({missing} player(s) missing)")]
    IpCollectionTimeout { missing: usize },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid lobby snapshot: {0}")]
    InvalidLobby(#[from] CoreError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("IP lookup error: {0}")]
    IpLookup(#[from] IpLookupError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

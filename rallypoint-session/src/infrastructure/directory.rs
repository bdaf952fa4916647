use crate::infrastructure::error::DirectoryError;
use async_trait::async_trait;
use rallypoint_core::{DataObject, Lobby, LobbyEvent, LobbyId, LobbyQuery, LobbySummary, Player, PlayerId};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Parameters for creating a lobby
#[derive(Debug, Clone)]
pub struct CreateLobbyRequest {
    pub name: String,
    pub max_players: usize,
    pub is_private: bool,
    pub data: HashMap<String, DataObject>,
    /// Creator, seeded as host
    pub player: Player,
}

/// Partial lobby update; unset fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct LobbyUpdate {
    /// `None` removes the key
    pub data: HashMap<String, Option<DataObject>>,
    pub is_private: Option<bool>,
    pub is_locked: Option<bool>,
    pub host_id: Option<PlayerId>,
}

impl LobbyUpdate {
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), Some(DataObject::member(value)));
        self
    }
}

/// Partial player update
#[derive(Debug, Clone, Default)]
pub struct PlayerUpdate {
    /// `None` removes the key
    pub data: HashMap<String, Option<DataObject>>,
}

impl PlayerUpdate {
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), Some(DataObject::member(value)));
        self
    }
}

/// Ordered event feed for one lobby
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct LobbySubscription {
    lobby_id: LobbyId,
    events: mpsc::UnboundedReceiver<LobbyEvent>,
}

impl LobbySubscription {
    pub fn new(lobby_id: LobbyId, events: mpsc::UnboundedReceiver<LobbyEvent>) -> Self {
        Self { lobby_id, events }
    }

    pub fn lobby_id(&self) -> &LobbyId {
        &self.lobby_id
    }

    /// Next event, `None` once the directory closed the feed
    pub async fn recv(&mut self) -> Option<LobbyEvent> {
        self.events.recv().await
    }
}

/// Remote lobby directory, as seen by one authenticated player
///
/// Every call may fail; callers treat a failure as "did not happen".
#[async_trait]
pub trait LobbyDirectory: Send + Sync {
    async fn create_lobby(&self, request: CreateLobbyRequest) -> DirectoryResult<Lobby>;

    async fn get_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<Lobby>;

    async fn update_lobby(&self, lobby_id: &LobbyId, update: LobbyUpdate) -> DirectoryResult<Lobby>;

    async fn delete_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<()>;

    async fn join_lobby_by_id(&self, lobby_id: &LobbyId, player: Player) -> DirectoryResult<Lobby>;

    async fn join_lobby_by_code(&self, lobby_code: &str, player: Player) -> DirectoryResult<Lobby>;

    async fn quick_join_lobby(&self, query: &LobbyQuery, player: Player) -> DirectoryResult<Lobby>;

    async fn update_player(
        &self,
        lobby_id: &LobbyId,
        player_id: &PlayerId,
        update: PlayerUpdate,
    ) -> DirectoryResult<Lobby>;

    async fn remove_player(&self, lobby_id: &LobbyId, player_id: &PlayerId) -> DirectoryResult<()>;

    /// Keep-alive so the directory does not expire the lobby
    async fn send_heartbeat_ping(&self, lobby_id: &LobbyId) -> DirectoryResult<()>;

    async fn query_lobbies(&self, query: &LobbyQuery) -> DirectoryResult<Vec<LobbySummary>>;

    async fn subscribe(&self, lobby_id: &LobbyId) -> DirectoryResult<LobbySubscription>;
}

use crate::infrastructure::directory::{
    CreateLobbyRequest, DirectoryResult, LobbyDirectory, LobbySubscription, LobbyUpdate,
    PlayerUpdate,
};
use crate::infrastructure::memory::MemoryLobbyService;
use async_trait::async_trait;
use rallypoint_core::{Lobby, LobbyId, LobbyQuery, LobbySummary, Player, PlayerId};

/// [`LobbyDirectory`] view of a [`MemoryLobbyService`] for one player
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    service: MemoryLobbyService,
    player_id: PlayerId,
}

impl MemoryDirectory {
    pub fn new(service: MemoryLobbyService, player_id: PlayerId) -> Self {
        Self { service, player_id }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn service(&self) -> &MemoryLobbyService {
        &self.service
    }
}

#[async_trait]
impl LobbyDirectory for MemoryDirectory {
    async fn create_lobby(&self, request: CreateLobbyRequest) -> DirectoryResult<Lobby> {
        self.service.create_lobby(&self.player_id, request).await
    }

    async fn get_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<Lobby> {
        self.service.get_lobby(lobby_id).await
    }

    async fn update_lobby(&self, lobby_id: &LobbyId, update: LobbyUpdate) -> DirectoryResult<Lobby> {
        self.service
            .update_lobby(&self.player_id, lobby_id, update)
            .await
    }

    async fn delete_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<()> {
        self.service.delete_lobby(&self.player_id, lobby_id).await
    }

    async fn join_lobby_by_id(&self, lobby_id: &LobbyId, player: Player) -> DirectoryResult<Lobby> {
        self.service.join_lobby_by_id(lobby_id, player).await
    }

    async fn join_lobby_by_code(&self, lobby_code: &str, player: Player) -> DirectoryResult<Lobby> {
        self.service.join_lobby_by_code(lobby_code, player).await
    }

    async fn quick_join_lobby(&self, query: &LobbyQuery, player: Player) -> DirectoryResult<Lobby> {
        self.service.quick_join_lobby(query, player).await
    }

    async fn update_player(
        &self,
        lobby_id: &LobbyId,
        player_id: &PlayerId,
        update: PlayerUpdate,
    ) -> DirectoryResult<Lobby> {
        self.service
            .update_player(&self.player_id, lobby_id, player_id, update)
            .await
    }

    async fn remove_player(&self, lobby_id: &LobbyId, player_id: &PlayerId) -> DirectoryResult<()> {
        self.service
            .remove_player(&self.player_id, lobby_id, player_id)
            .await
    }

    async fn send_heartbeat_ping(&self, lobby_id: &LobbyId) -> DirectoryResult<()> {
        self.service.send_heartbeat_ping(lobby_id).await
    }

    async fn query_lobbies(&self, query: &LobbyQuery) -> DirectoryResult<Vec<LobbySummary>> {
        self.service.query_lobbies(query).await
    }

    async fn subscribe(&self, lobby_id: &LobbyId) -> DirectoryResult<LobbySubscription> {
        self.service.subscribe(&self.player_id, lobby_id).await
    }
}

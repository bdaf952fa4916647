use crate::infrastructure::directory::{
    CreateLobbyRequest, DirectoryResult, LobbySubscription, LobbyUpdate, PlayerUpdate,
};
use crate::infrastructure::error::DirectoryError;
use crate::infrastructure::memory::MemoryDirectory;
use rallypoint_core::{
    Lobby, LobbyChange, LobbyEvent, LobbyId, LobbyQuery, LobbySummary, Player, PlayerId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Debug)]
struct Subscriber {
    player_id: PlayerId,
    sender: mpsc::UnboundedSender<LobbyEvent>,
}

#[derive(Debug, Default)]
struct ServiceState {
    lobbies: HashMap<LobbyId, Lobby>,
    subscribers: HashMap<LobbyId, Vec<Subscriber>>,
    calls: HashMap<&'static str, usize>,
    /// Operations whose next call(s) fail
    failures: HashMap<&'static str, usize>,
    /// Events to swallow before delivering to a player
    dropped_events: HashMap<PlayerId, usize>,
}

impl ServiceState {
    /// Record a call and consume an injected failure, if any
    fn enter(&mut self, op: &'static str) -> DirectoryResult<()> {
        *self.calls.entry(op).or_default() += 1;

        match self.failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                debug!(op, "💥 Injected directory failure");
                Err(DirectoryError::Unavailable(format!("{op} failed (injected)")))
            }
            _ => Ok(()),
        }
    }

    fn lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<&Lobby> {
        self.lobbies
            .get(lobby_id)
            .ok_or_else(|| DirectoryError::LobbyNotFound(lobby_id.clone()))
    }

    fn lobby_by_code(&self, lobby_code: &str) -> DirectoryResult<LobbyId> {
        self.lobbies
            .values()
            .find(|l| l.lobby_code().eq_ignore_ascii_case(lobby_code))
            .map(|l| l.id().clone())
            .ok_or_else(|| DirectoryError::LobbyNotFound(LobbyId::new(lobby_code)))
    }

    /// Apply `change` to the stored lobby and push it to every subscriber
    fn commit(&mut self, lobby_id: &LobbyId, change: LobbyChange) -> DirectoryResult<Lobby> {
        let lobby = self
            .lobbies
            .get_mut(lobby_id)
            .ok_or_else(|| DirectoryError::LobbyNotFound(lobby_id.clone()))?;
        change.apply_to(lobby);
        let lobby = lobby.clone();

        self.publish(lobby_id, &LobbyEvent::LobbyChanged(change), None);
        Ok(lobby)
    }

    fn publish(&mut self, lobby_id: &LobbyId, event: &LobbyEvent, except: Option<&PlayerId>) {
        let Some(subscribers) = self.subscribers.get_mut(lobby_id) else {
            return;
        };

        let dropped = &mut self.dropped_events;
        subscribers.retain(|subscriber| {
            if except == Some(&subscriber.player_id) {
                return true;
            }
            if let Some(remaining) = dropped.get_mut(&subscriber.player_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    debug!(player = %subscriber.player_id, kind = event.kind(), "🕳️ Event dropped");
                    return true;
                }
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }

    fn unsubscribe(&mut self, lobby_id: &LobbyId, player_id: &PlayerId) -> Option<Subscriber> {
        let subscribers = self.subscribers.get_mut(lobby_id)?;
        let position = subscribers.iter().position(|s| &s.player_id == player_id)?;
        Some(subscribers.remove(position))
    }

    fn delete(&mut self, lobby_id: &LobbyId) -> DirectoryResult<()> {
        let lobby = self
            .lobbies
            .remove(lobby_id)
            .ok_or_else(|| DirectoryError::LobbyNotFound(lobby_id.clone()))?;

        let event = LobbyEvent::LobbyChanged(LobbyChange::deleted(lobby.version() + 1));
        self.publish(lobby_id, &event, None);
        self.subscribers.remove(lobby_id);
        info!(lobby = %lobby_id, "🗑️ Lobby deleted");
        Ok(())
    }

    fn join(&mut self, lobby_id: &LobbyId, player: Player) -> DirectoryResult<Lobby> {
        let lobby = self.lobby(lobby_id)?;

        if lobby.player(player.id()).is_some() {
            return Ok(lobby.clone());
        }
        if lobby.is_locked() {
            return Err(DirectoryError::LobbyLocked(lobby_id.clone()));
        }
        if lobby.is_full() {
            return Err(DirectoryError::LobbyFull(lobby_id.clone()));
        }

        info!(lobby = %lobby_id, player = %player.id(), "➕ Player joined");
        let change = LobbyChange::new(lobby.version() + 1).with_player_joined(player);
        self.commit(lobby_id, change)
    }
}

/// In-process lobby directory shared by every simulated peer
///
/// Every mutation is expressed as a versioned [`LobbyChange`] and pushed to
/// subscribers in commit order. Failures and lost events can be injected
/// for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLobbyService {
    state: Arc<RwLock<ServiceState>>,
}

impl MemoryLobbyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory client acting as `player_id`
    pub fn directory(&self, player_id: &PlayerId) -> Arc<MemoryDirectory> {
        Arc::new(MemoryDirectory::new(self.clone(), player_id.clone()))
    }

    // ===== Test controls =====

    /// Make the next `times` calls of `op` fail with `Unavailable`
    pub async fn fail_next(&self, op: &'static str, times: usize) {
        self.state.write().await.failures.insert(op, times);
    }

    /// Swallow the next `count` events addressed to `player_id`
    pub async fn drop_events_for(&self, player_id: &PlayerId, count: usize) {
        self.state
            .write()
            .await
            .dropped_events
            .insert(player_id.clone(), count);
    }

    /// Number of calls made to `op` so far
    pub async fn call_count(&self, op: &str) -> usize {
        self.state.read().await.calls.get(op).copied().unwrap_or(0)
    }

    pub async fn lobby(&self, lobby_id: &LobbyId) -> Option<Lobby> {
        self.state.read().await.lobbies.get(lobby_id).cloned()
    }

    pub async fn lobby_count(&self) -> usize {
        self.state.read().await.lobbies.len()
    }

    /// Push an arbitrary event to every subscriber of `lobby_id`
    pub async fn inject_event(&self, lobby_id: &LobbyId, event: LobbyEvent) {
        self.state.write().await.publish(lobby_id, &event, None);
    }

    // ===== Directory operations =====

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub(crate) async fn create_lobby(
        &self,
        caller: &PlayerId,
        request: CreateLobbyRequest,
    ) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("create_lobby")?;

        if request.player.id() != caller {
            return Err(DirectoryError::PermissionDenied(
                "lobby creator must be the caller".to_string(),
            ));
        }

        let lobby_id = LobbyId::generate();
        let lobby_code = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        let lobby = Lobby::new(lobby_id.clone(), request.name, lobby_code, request.player)
            .with_data(request.data)
            .with_private(request.is_private)
            .with_max_players(request.max_players);

        info!(lobby = %lobby_id, code = lobby.lobby_code(), "🏠 Lobby created");
        state.lobbies.insert(lobby_id, lobby.clone());
        Ok(lobby)
    }

    pub(crate) async fn get_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("get_lobby")?;
        state.lobby(lobby_id).cloned()
    }

    #[instrument(skip(self, update))]
    pub(crate) async fn update_lobby(
        &self,
        caller: &PlayerId,
        lobby_id: &LobbyId,
        update: LobbyUpdate,
    ) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("update_lobby")?;

        let lobby = state.lobby(lobby_id)?;
        if !lobby.is_host(caller) {
            return Err(DirectoryError::PermissionDenied(
                "only the host can update the lobby".to_string(),
            ));
        }

        let mut change = LobbyChange::new(lobby.version() + 1);
        change.data_changed = update.data;
        change.is_private = update.is_private;
        change.is_locked = update.is_locked;
        if let Some(host_id) = update.host_id {
            if lobby.player(&host_id).is_none() {
                return Err(DirectoryError::PlayerNotFound {
                    lobby: lobby_id.clone(),
                    player: host_id,
                });
            }
            change.host_id = Some(host_id);
        }

        state.commit(lobby_id, change)
    }

    pub(crate) async fn delete_lobby(&self, caller: &PlayerId, lobby_id: &LobbyId) -> DirectoryResult<()> {
        let mut state = self.state.write().await;
        state.enter("delete_lobby")?;

        if !state.lobby(lobby_id)?.is_host(caller) {
            return Err(DirectoryError::PermissionDenied(
                "only the host can delete the lobby".to_string(),
            ));
        }

        state.delete(lobby_id)
    }

    pub(crate) async fn join_lobby_by_id(&self, lobby_id: &LobbyId, player: Player) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("join_lobby")?;
        state.join(lobby_id, player)
    }

    pub(crate) async fn join_lobby_by_code(&self, lobby_code: &str, player: Player) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("join_lobby")?;
        let lobby_id = state.lobby_by_code(lobby_code)?;
        state.join(&lobby_id, player)
    }

    pub(crate) async fn quick_join_lobby(&self, query: &LobbyQuery, player: Player) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("quick_join_lobby")?;

        let lobby_id = state
            .lobbies
            .values()
            .find(|l| query.matches(l) && !l.is_locked())
            .map(|l| l.id().clone())
            .ok_or(DirectoryError::NoOpenLobby)?;

        state.join(&lobby_id, player)
    }

    pub(crate) async fn update_player(
        &self,
        caller: &PlayerId,
        lobby_id: &LobbyId,
        player_id: &PlayerId,
        update: PlayerUpdate,
    ) -> DirectoryResult<Lobby> {
        let mut state = self.state.write().await;
        state.enter("update_player")?;

        if caller != player_id {
            return Err(DirectoryError::PermissionDenied(
                "players can only update themselves".to_string(),
            ));
        }

        let lobby = state.lobby(lobby_id)?;
        if lobby.player(player_id).is_none() {
            return Err(DirectoryError::PlayerNotFound {
                lobby: lobby_id.clone(),
                player: player_id.clone(),
            });
        }

        let mut change = LobbyChange::new(lobby.version() + 1);
        change.player_data_changed.insert(player_id.clone(), update.data);
        state.commit(lobby_id, change)
    }

    /// Remove a player; the host may remove anyone
    ///
    /// A host leaving hands the lobby to the first remaining player. The
    /// last player leaving deletes the lobby.
    #[instrument(skip(self))]
    pub(crate) async fn remove_player(
        &self,
        caller: &PlayerId,
        lobby_id: &LobbyId,
        player_id: &PlayerId,
    ) -> DirectoryResult<()> {
        let mut state = self.state.write().await;
        state.enter("remove_player")?;

        let lobby = state.lobby(lobby_id)?;
        if caller != player_id && !lobby.is_host(caller) {
            return Err(DirectoryError::PermissionDenied(
                "only the host can remove other players".to_string(),
            ));
        }
        if lobby.player(player_id).is_none() {
            return Err(DirectoryError::PlayerNotFound {
                lobby: lobby_id.clone(),
                player: player_id.clone(),
            });
        }

        if lobby.players().len() == 1 {
            return state.delete(lobby_id);
        }

        let mut change = LobbyChange::new(lobby.version() + 1).with_player_left(player_id.clone());
        if lobby.is_host(player_id) {
            if let Some(next_host) = lobby.players().iter().find(|p| p.id() != player_id) {
                info!(lobby = %lobby_id, host = %next_host.id(), "👑 Host migrated");
                change = change.with_host(next_host.id().clone());
            }
        }

        if let Some(removed) = state.unsubscribe(lobby_id, player_id) {
            if caller != player_id {
                let _ = removed.sender.send(LobbyEvent::KickedFromLobby);
            }
        }

        info!(lobby = %lobby_id, player = %player_id, "➖ Player removed");
        state.commit(lobby_id, change)?;
        Ok(())
    }

    pub(crate) async fn send_heartbeat_ping(&self, lobby_id: &LobbyId) -> DirectoryResult<()> {
        let mut state = self.state.write().await;
        state.enter("send_heartbeat_ping")?;
        state.lobby(lobby_id)?;
        Ok(())
    }

    pub(crate) async fn query_lobbies(&self, query: &LobbyQuery) -> DirectoryResult<Vec<LobbySummary>> {
        let mut state = self.state.write().await;
        state.enter("query_lobbies")?;

        let mut lobbies: Vec<LobbySummary> = state
            .lobbies
            .values()
            .filter(|l| query.matches(l))
            .map(Lobby::summary)
            .collect();
        lobbies.sort_by(|a, b| a.name.cmp(&b.name));
        lobbies.truncate(query.limit);
        Ok(lobbies)
    }

    /// Subscribe `caller` to `lobby_id`, replacing an earlier subscription
    pub(crate) async fn subscribe(&self, caller: &PlayerId, lobby_id: &LobbyId) -> DirectoryResult<LobbySubscription> {
        let mut state = self.state.write().await;
        state.enter("subscribe")?;
        state.lobby(lobby_id)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.unsubscribe(lobby_id, caller);
        state
            .subscribers
            .entry(lobby_id.clone())
            .or_default()
            .push(Subscriber {
                player_id: caller.clone(),
                sender,
            });

        debug!(lobby = %lobby_id, player = %caller, "📡 Subscribed to lobby events");
        Ok(LobbySubscription::new(lobby_id.clone(), receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rallypoint_core::DataObject;

    fn seed(id: &str) -> Player {
        Player::new(PlayerId::new(id))
    }

    async fn hosted(service: &MemoryLobbyService) -> Lobby {
        let host = PlayerId::new("host");
        service
            .create_lobby(
                &host,
                CreateLobbyRequest {
                    name: "test".to_string(),
                    max_players: 3,
                    is_private: false,
                    data: HashMap::new(),
                    player: seed("host"),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_bumps_version_and_notifies() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        let mut events = service.subscribe(&PlayerId::new("host"), lobby.id()).await.unwrap();

        let joined = service.join_lobby_by_id(lobby.id(), seed("guest")).await.unwrap();
        assert_eq!(joined.version(), 2);
        assert_eq!(joined.players().len(), 2);

        match events.recv().await {
            Some(LobbyEvent::LobbyChanged(change)) => {
                assert_eq!(change.version, 2);
                assert_eq!(change.players_joined.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_rejects_full_lobby() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;

        service.join_lobby_by_id(lobby.id(), seed("a")).await.unwrap();
        service.join_lobby_by_id(lobby.id(), seed("b")).await.unwrap();
        let result = service.join_lobby_by_id(lobby.id(), seed("c")).await;

        assert!(matches!(result, Err(DirectoryError::LobbyFull(_))));
    }

    #[tokio::test]
    async fn test_host_leaving_migrates_host() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        service.join_lobby_by_id(lobby.id(), seed("guest")).await.unwrap();

        let host = PlayerId::new("host");
        service.remove_player(&host, lobby.id(), &host).await.unwrap();

        let lobby = service.lobby(lobby.id()).await.unwrap();
        assert_eq!(lobby.host_id(), &PlayerId::new("guest"));
        assert_eq!(lobby.version(), 3);
    }

    #[tokio::test]
    async fn test_kicked_player_only_sees_kick() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        let guest = PlayerId::new("guest");
        service.join_lobby_by_id(lobby.id(), seed("guest")).await.unwrap();
        let mut events = service.subscribe(&guest, lobby.id()).await.unwrap();

        service
            .remove_player(&PlayerId::new("host"), lobby.id(), &guest)
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(LobbyEvent::KickedFromLobby));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_last_player_leaving_deletes_lobby() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        let host = PlayerId::new("host");

        service.remove_player(&host, lobby.id(), &host).await.unwrap();

        assert_eq!(service.lobby_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        service.fail_next("get_lobby", 1).await;

        assert!(service.get_lobby(lobby.id()).await.is_err());
        assert!(service.get_lobby(lobby.id()).await.is_ok());
        assert_eq!(service.call_count("get_lobby").await, 2);
    }

    #[tokio::test]
    async fn test_player_update_requires_self() {
        let service = MemoryLobbyService::new();
        let lobby = hosted(&service).await;
        service.join_lobby_by_id(lobby.id(), seed("guest")).await.unwrap();

        let mut update = PlayerUpdate::default();
        update.data.insert("k".to_string(), Some(DataObject::member("v")));
        let result = service
            .update_player(&PlayerId::new("host"), lobby.id(), &PlayerId::new("guest"), update)
            .await;

        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));
    }
}

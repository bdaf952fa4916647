use crate::application::config::SessionConfig;
use crate::application::notifications::LobbyNotification;
use crate::application::runtime::{LoopSlot, RateLimiter, RateLimiters, RequestType};
use crate::domain::{LeaveReason, SessionRole, SessionState};
use crate::infrastructure::directory::{
    CreateLobbyRequest, DirectoryResult, LobbyDirectory, LobbySubscription, LobbyUpdate,
    PlayerUpdate,
};
use crate::infrastructure::error::{Result, SessionError};
use rallypoint_core::{
    keys, Clock, DataObject, Lobby, LobbyId, LobbyQuery, LobbySummary, Player, PlayerId,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const NOTIFICATION_CAPACITY: usize = 128;

/// Background loops owned by one coordinator
#[derive(Debug)]
pub(crate) struct SessionLoops {
    pub(crate) events: LoopSlot,
    pub(crate) keepalive: LoopSlot,
    pub(crate) heartbeat: LoopSlot,
    pub(crate) watchdog: LoopSlot,
    pub(crate) query: LoopSlot,
}

impl SessionLoops {
    fn new() -> Self {
        Self {
            events: LoopSlot::new("lobby-events"),
            keepalive: LoopSlot::new("host-keepalive"),
            heartbeat: LoopSlot::new("self-heartbeat"),
            watchdog: LoopSlot::new("watchdog"),
            query: LoopSlot::new("lobby-query"),
        }
    }

    /// Stop every loop tied to the joined lobby (browsing keeps running)
    pub(crate) fn stop_lobby_loops(&self) {
        self.events.stop();
        self.keepalive.stop();
        self.heartbeat.stop();
        self.watchdog.stop();
    }
}

pub(crate) struct CoordinatorInner {
    pub(crate) config: SessionConfig,
    pub(crate) local_player_id: PlayerId,
    pub(crate) display_name: String,
    pub(crate) directory: Arc<dyn LobbyDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) limiters: RateLimiters,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) notifications: broadcast::Sender<LobbyNotification>,
    pub(crate) loops: SessionLoops,
}

impl CoordinatorInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drives hosting, joining and leaving one lobby at a time
///
/// Cheap to clone; every clone shares the same session. Background loops
/// only hold weak references, so dropping the last handle stops them.
#[derive(Clone)]
pub struct LobbyCoordinator {
    pub(crate) inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for LobbyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyCoordinator")
            .field("local_player_id", &self.inner.local_player_id)
            .field("role", &self.role())
            .finish()
    }
}

impl LobbyCoordinator {
    pub(crate) fn from_parts(
        config: SessionConfig,
        local_player_id: PlayerId,
        display_name: String,
        directory: Arc<dyn LobbyDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let limiters = RateLimiters::from_config(&config.rate_limits);

        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                local_player_id,
                display_name,
                directory,
                clock,
                limiters,
                state: Mutex::new(SessionState::default()),
                notifications,
                loops: SessionLoops::new(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<CoordinatorInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<CoordinatorInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ===== Accessors =====

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn local_player_id(&self) -> &PlayerId {
        &self.inner.local_player_id
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn role(&self) -> SessionRole {
        self.inner.lock_state().role
    }

    /// Snapshot of the joined lobby
    pub fn lobby(&self) -> Option<Lobby> {
        self.inner.lock_state().lobby.clone()
    }

    pub fn lobby_id(&self) -> Option<LobbyId> {
        self.inner.lock_state().lobby_id().cloned()
    }

    /// Whether the cached lobby names the local player as host
    pub fn is_local_player_host(&self) -> bool {
        self.inner.lock_state().is_host(&self.inner.local_player_id)
    }

    pub fn local_player(&self) -> Option<Player> {
        let state = self.inner.lock_state();
        state
            .lobby
            .as_ref()
            .and_then(|l| l.player(&self.inner.local_player_id))
            .cloned()
    }

    pub fn lobby_data_value(&self, key: &str) -> Option<String> {
        let state = self.inner.lock_state();
        state
            .lobby
            .as_ref()
            .and_then(|l| l.data_value(key))
            .map(str::to_string)
    }

    pub fn player_data_value(&self, player_id: &PlayerId, key: &str) -> Option<String> {
        let state = self.inner.lock_state();
        state
            .lobby
            .as_ref()
            .and_then(|l| l.player_data_value(player_id, key))
            .map(str::to_string)
    }

    /// Limiter of a request category, e.g. to reflect cooldowns in a UI
    pub fn rate_limiter(&self, request: RequestType) -> &RateLimiter {
        self.inner.limiters.get(request)
    }

    /// Subscribe to lobby lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<LobbyNotification> {
        self.inner.notifications.subscribe()
    }

    pub(crate) fn notify(&self, notification: LobbyNotification) {
        // No receivers is fine
        let _ = self.inner.notifications.send(notification);
    }

    /// Lobby id while the local peer is hosting it
    pub(crate) fn hosted_lobby(&self) -> Option<Lobby> {
        let state = self.inner.lock_state();
        if state.role != SessionRole::Hosting || !state.is_host(&self.inner.local_player_id) {
            return None;
        }
        state.lobby.clone()
    }

    /// Player record the local peer joins with
    fn local_player_seed(&self) -> Player {
        Player::new(self.inner.local_player_id.clone())
            .with_data(
                keys::DISPLAY_NAME,
                DataObject::member(self.inner.display_name.clone()),
            )
            .with_data(keys::IS_READY, DataObject::member(keys::ready_flag(false)))
    }

    // ===== Hosting / joining =====

    /// Create a lobby and host it
    ///
    /// No-op (`AlreadyInLobby`) while connecting, hosting or joined.
    pub async fn host_lobby(
        &self,
        initial_data: HashMap<String, DataObject>,
        is_private: bool,
    ) -> Result<Lobby> {
        let request = CreateLobbyRequest {
            name: format!("{}'s lobby", self.inner.display_name),
            max_players: self.inner.config.max_lobby_size,
            is_private,
            data: initial_data,
            player: self.local_player_seed(),
        };

        self.connect(SessionRole::Hosting, RequestType::Create, move |directory| async move {
            directory.create_lobby(request).await
        })
        .await
    }

    pub async fn join_lobby_by_id(&self, lobby_id: &LobbyId) -> Result<Lobby> {
        let lobby_id = lobby_id.clone();
        let player = self.local_player_seed();

        self.connect(SessionRole::Joined, RequestType::Join, move |directory| async move {
            directory.join_lobby_by_id(&lobby_id, player).await
        })
        .await
    }

    pub async fn join_lobby_by_code(&self, lobby_code: &str) -> Result<Lobby> {
        let lobby_code = lobby_code.to_string();
        let player = self.local_player_seed();

        self.connect(SessionRole::Joined, RequestType::Join, move |directory| async move {
            directory.join_lobby_by_code(&lobby_code, player).await
        })
        .await
    }

    pub async fn quick_join(&self, query: &LobbyQuery) -> Result<Lobby> {
        let query = query.clone();
        let player = self.local_player_seed();

        self.connect(SessionRole::Joined, RequestType::QuickJoin, move |directory| async move {
            directory.quick_join_lobby(&query, player).await
        })
        .await
    }

    async fn connect<F, Fut>(&self, role: SessionRole, request: RequestType, call: F) -> Result<Lobby>
    where
        F: FnOnce(Arc<dyn LobbyDirectory>) -> Fut,
        Fut: Future<Output = DirectoryResult<Lobby>>,
    {
        self.begin_connecting()?;

        self.inner.limiters.get(request).acquire().await;

        match call(self.inner.directory.clone()).await {
            Ok(lobby) => Ok(self.enter_lobby(lobby, role).await),
            Err(e) => {
                self.abort_connecting();
                warn!(%request, error = %e, "❌ Lobby request failed");
                Err(e.into())
            }
        }
    }

    fn begin_connecting(&self) -> Result<()> {
        if self.inner.local_player_id.is_empty() {
            error!("❌ Local player id is missing, cannot enter a lobby");
            return Err(SessionError::MissingLocalPlayerId);
        }

        let mut state = self.inner.lock_state();
        if state.role != SessionRole::Idle {
            debug!(role = %state.role, "Already in (or entering) a lobby, ignoring");
            return Err(SessionError::AlreadyInLobby);
        }
        state.role = SessionRole::Connecting;
        Ok(())
    }

    fn abort_connecting(&self) {
        let mut state = self.inner.lock_state();
        if state.role == SessionRole::Connecting {
            state.role = SessionRole::Idle;
        }
    }

    async fn enter_lobby(&self, lobby: Lobby, role: SessionRole) -> Lobby {
        let subscription = match self.inner.directory.subscribe(lobby.id()).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(lobby = %lobby.id(), error = %e, "⚠️ Could not subscribe to lobby events");
                None
            }
        };

        {
            let mut state = self.inner.lock_state();
            state.lobby = Some(lobby.clone());
            state.role = role;
        }

        if let Some(subscription) = subscription {
            self.start_event_loop(subscription);
        }
        self.start_member_loops();

        match role {
            SessionRole::Hosting => {
                self.start_host_loops();
                info!(lobby = %lobby.id(), code = lobby.lobby_code(), "👑 Hosting lobby");
                self.notify(LobbyNotification::Hosted {
                    lobby: lobby.clone(),
                    migrated: false,
                });
            }
            _ => {
                info!(lobby = %lobby.id(), players = lobby.players().len(), "🟢 Joined lobby");
                self.notify(LobbyNotification::Joined(lobby.clone()));
            }
        }

        lobby
    }

    fn start_event_loop(&self, mut subscription: LobbySubscription) {
        let weak = self.downgrade();
        self.inner.loops.events.restart(move |token| async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = subscription.recv() => event,
                };

                let Some(event) = event else {
                    debug!(lobby = %subscription.lobby_id(), "Lobby event feed closed");
                    break;
                };

                let Some(coordinator) = LobbyCoordinator::upgrade(&weak) else {
                    break;
                };

                if token.is_cancelled() {
                    break;
                }

                coordinator.process_event(event).await;
            }
        });
    }

    // ===== Leaving =====

    /// Stop hosting: delete the lobby, or just leave it for a migrating peer
    ///
    /// Local state is cleared even when the directory call fails; the
    /// failure is logged and returned.
    pub async fn stop_hosting(&self, delete_lobby: bool) -> Result<()> {
        let lobby_id = {
            let state = self.inner.lock_state();
            if state.role != SessionRole::Hosting {
                return Err(SessionError::NotHost);
            }
            state.lobby_id().cloned().ok_or(SessionError::NotInLobby)?
        };

        self.inner.loops.stop_lobby_loops();

        let result = if delete_lobby {
            self.inner.limiters.get(RequestType::Delete).acquire().await;
            self.inner.directory.delete_lobby(&lobby_id).await
        } else {
            self.inner.limiters.get(RequestType::RemovePlayer).acquire().await;
            self.inner
                .directory
                .remove_player(&lobby_id, &self.inner.local_player_id)
                .await
        };

        info!(lobby = %lobby_id, delete_lobby, "🛑 Stopped hosting");
        self.finish_leave(&lobby_id, LeaveReason::Requested);

        result.map_err(|e| {
            warn!(lobby = %lobby_id, error = %e, "⚠️ Directory teardown failed");
            e.into()
        })
    }

    /// Leave the joined lobby
    ///
    /// A host deletes the lobby unless migration can hand it to a
    /// remaining member.
    pub async fn leave_joined_lobby(&self) -> Result<()> {
        let (role, lobby_id, player_count) = {
            let state = self.inner.lock_state();
            match state.lobby.as_ref() {
                Some(lobby) => (state.role, lobby.id().clone(), lobby.players().len()),
                None => return Err(SessionError::NotInLobby),
            }
        };

        match role {
            SessionRole::Hosting => {
                let delete = !self.inner.config.enable_host_migration || player_count <= 1;
                self.stop_hosting(delete).await
            }
            SessionRole::Joined => {
                self.inner.loops.stop_lobby_loops();

                self.inner.limiters.get(RequestType::RemovePlayer).acquire().await;
                let result = self
                    .inner
                    .directory
                    .remove_player(&lobby_id, &self.inner.local_player_id)
                    .await;

                info!(lobby = %lobby_id, "👋 Left lobby");
                self.finish_leave(&lobby_id, LeaveReason::Requested);

                result.map_err(|e| {
                    warn!(lobby = %lobby_id, error = %e, "⚠️ Directory leave failed");
                    e.into()
                })
            }
            _ => Err(SessionError::NotInLobby),
        }
    }

    /// Best-effort teardown for process exit
    ///
    /// Clears local state at once and fires the directory call on a
    /// detached task without waiting for it or the rate limiter. Errors
    /// are swallowed.
    pub fn end_connections_immediately(&self) {
        self.inner.loops.stop_lobby_loops();
        self.inner.loops.query.stop();

        let (role, lobby) = self.inner.lock_state().clear();
        let Some(lobby) = lobby else {
            return;
        };

        let delete = role == SessionRole::Hosting
            && (!self.inner.config.enable_host_migration || lobby.players().len() <= 1);
        let directory = self.inner.directory.clone();
        let lobby_id = lobby.id().clone();
        let local_player_id = self.inner.local_player_id.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lobby_id = lobby_id.clone();
                handle.spawn(async move {
                    let result = if delete {
                        directory.delete_lobby(&lobby_id).await
                    } else {
                        directory.remove_player(&lobby_id, &local_player_id).await
                    };
                    if let Err(e) = result {
                        debug!(lobby = %lobby_id, error = %e, "Teardown call failed (ignored)");
                    }
                });
            }
            Err(_) => {
                warn!(lobby = %lobby_id, "⚠️ No async runtime, skipping directory teardown");
            }
        }

        info!(lobby = %lobby_id, delete, "🔌 Connections ended");
        self.notify(LobbyNotification::Left {
            lobby_id,
            reason: LeaveReason::Shutdown,
        });
    }

    /// Drop local lobby state and publish `Left`, if still in `lobby_id`
    pub(crate) fn finish_leave(&self, lobby_id: &LobbyId, reason: LeaveReason) {
        {
            let mut state = self.inner.lock_state();
            if state.lobby_id() != Some(lobby_id) {
                return;
            }
            state.clear();
        }

        self.notify(LobbyNotification::Left {
            lobby_id: lobby_id.clone(),
            reason,
        });
    }

    // ===== Browsing =====

    pub async fn query_lobbies(&self, query: &LobbyQuery) -> Result<Vec<LobbySummary>> {
        self.inner.limiters.get(RequestType::Query).acquire().await;

        let lobbies = self.inner.directory.query_lobbies(query).await.map_err(|e| {
            warn!(error = %e, "❌ Lobby query failed");
            e
        })?;

        debug!(count = lobbies.len(), "📋 Lobbies loaded");
        self.notify(LobbyNotification::LobbiesLoaded(lobbies.clone()));
        Ok(lobbies)
    }

    /// Poll the directory every `query_interval`; `false` if already polling
    pub fn start_querying_lobbies(&self, query: LobbyQuery) -> bool {
        let weak = self.downgrade();
        let period = self.inner.config.query_interval();

        let started = self.inner.loops.query.start(move |token| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let Some(coordinator) = LobbyCoordinator::upgrade(&weak) else {
                    break;
                };

                tokio::select! {
                    _ = token.cancelled() => break,
                    // Failures are logged inside; the next tick retries
                    _ = coordinator.query_lobbies(&query) => {}
                }
            }
        });

        if !started {
            warn!("⚠️ Already querying lobbies");
        }
        started
    }

    pub fn stop_querying_lobbies(&self) -> bool {
        self.inner.loops.query.stop()
    }

    // ===== Metadata =====

    /// Write lobby metadata (host only)
    ///
    /// The change reaches the local snapshot through the event feed.
    pub async fn set_lobby_data_values<I, K, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let update = values
            .into_iter()
            .fold(LobbyUpdate::default(), |update, (k, v)| update.with_data(k, v));
        self.update_hosted_lobby(update).await
    }

    pub async fn set_lobby_locked(&self, is_locked: bool) -> Result<()> {
        self.update_hosted_lobby(LobbyUpdate {
            is_locked: Some(is_locked),
            ..Default::default()
        })
        .await
    }

    pub async fn set_lobby_private(&self, is_private: bool) -> Result<()> {
        self.update_hosted_lobby(LobbyUpdate {
            is_private: Some(is_private),
            ..Default::default()
        })
        .await
    }

    async fn update_hosted_lobby(&self, update: LobbyUpdate) -> Result<()> {
        let lobby_id = {
            let state = self.inner.lock_state();
            let lobby_id = state.lobby_id().cloned().ok_or(SessionError::NotInLobby)?;
            if !state.is_host(&self.inner.local_player_id) {
                return Err(SessionError::NotHost);
            }
            lobby_id
        };

        self.inner.limiters.get(RequestType::UpdateLobby).acquire().await;
        self.inner
            .directory
            .update_lobby(&lobby_id, update)
            .await
            .map_err(|e| {
                warn!(lobby = %lobby_id, error = %e, "❌ Lobby update failed");
                e
            })?;
        Ok(())
    }

    /// Write metadata on the local player
    pub async fn set_player_data_values<I, K, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let update = values
            .into_iter()
            .fold(PlayerUpdate::default(), |update, (k, v)| update.with_data(k, v));

        let lobby_id = self.lobby_id().ok_or(SessionError::NotInLobby)?;

        self.inner.limiters.get(RequestType::UpdatePlayer).acquire().await;
        self.inner
            .directory
            .update_player(&lobby_id, &self.inner.local_player_id, update)
            .await
            .map_err(|e| {
                warn!(lobby = %lobby_id, error = %e, "❌ Player update failed");
                e
            })?;
        Ok(())
    }

    pub async fn set_ready(&self, ready: bool) -> Result<()> {
        self.set_player_data_values([(keys::IS_READY, keys::ready_flag(ready))])
            .await
    }

    /// Flag the local player as paused so the host watchdog skips it
    pub async fn set_sleeping(&self, sleeping: bool) -> Result<()> {
        self.set_player_data_values([(keys::IS_SLEEPING, keys::sleeping_flag(sleeping))])
            .await
    }
}

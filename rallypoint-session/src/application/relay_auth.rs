use crate::application::coordinator::LobbyCoordinator;
use crate::application::notifications::{LobbyNotification, RelayNotification};
use crate::application::runtime::LoopSlot;
use crate::infrastructure::error::{RelayError, Result, SessionError};
use crate::infrastructure::relay::RelayClient;
use futures::future::join_all;
use rallypoint_core::{keys, Lobby, Player, PlayerId, RelaySession};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, watch};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NOTIFICATION_CAPACITY: usize = 32;

/// Progress of the client-side authorization wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    #[default]
    Idle,
    /// Local public IP not yet visible in the lobby
    WaitingForLocalIp,
    /// Polling the relay until the local IP is authorized
    PollingAuthorization,
    Ready,
    Failed,
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationStatus::Idle => write!(f, "Idle"),
            AuthorizationStatus::WaitingForLocalIp => write!(f, "WaitingForLocalIp"),
            AuthorizationStatus::PollingAuthorization => write!(f, "PollingAuthorization"),
            AuthorizationStatus::Ready => write!(f, "Ready"),
            AuthorizationStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Default)]
struct RelayState {
    session: Option<RelaySession>,
    /// Players whose IP was authorized, or whose authorization is in flight
    authorized: HashSet<PlayerId>,
    /// Last relay session id seen in lobby data (client side)
    last_session_id: String,
}

struct RelayInner {
    lobby: LobbyCoordinator,
    relay: Arc<dyn RelayClient>,
    state: Mutex<RelayState>,
    notifications: broadcast::Sender<RelayNotification>,
    status: watch::Sender<AuthorizationStatus>,
    wait: LoopSlot,
    listener: LoopSlot,
}

/// Keeps peers authorized on the relay session published in the lobby
///
/// As host it authorizes every member's public IP once and revokes members
/// that leave. As client it waits, within a bounded budget, until its own
/// IP shows up as authorized.
#[derive(Clone)]
pub struct RelayAuthorizationCoordinator {
    inner: Arc<RelayInner>,
}

impl fmt::Debug for RelayAuthorizationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayAuthorizationCoordinator")
            .field("session_id", &self.session_id())
            .field("status", &self.authorization_status())
            .finish()
    }
}

impl RelayAuthorizationCoordinator {
    pub fn new(lobby: LobbyCoordinator, relay: Arc<dyn RelayClient>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (status, _) = watch::channel(AuthorizationStatus::Idle);

        Self {
            inner: Arc::new(RelayInner {
                lobby,
                relay,
                state: Mutex::new(RelayState::default()),
                notifications,
                status,
                wait: LoopSlot::new("relay-authorization-wait"),
                listener: LoopSlot::new("relay-listener"),
            }),
        }
    }

    fn upgrade(weak: &Weak<RelayInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn lock_state(&self) -> MutexGuard<'_, RelayState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start following the lobby coordinator's notifications
    ///
    /// Returns `false` when already attached.
    pub fn attach(&self) -> bool {
        let mut notifications = self.inner.lobby.subscribe();
        let weak = Arc::downgrade(&self.inner);

        self.inner.listener.start(move |token| async move {
            loop {
                let notification = tokio::select! {
                    _ = token.cancelled() => break,
                    notification = notifications.recv() => notification,
                };

                let notification = match notification {
                    Ok(notification) => notification,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "⚠️ Relay listener lagged behind lobby notifications");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(coordinator) = RelayAuthorizationCoordinator::upgrade(&weak) else {
                    break;
                };
                coordinator.handle_lobby_notification(notification).await;
            }
        })
    }

    pub fn detach(&self) -> bool {
        self.inner.listener.stop()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayNotification> {
        self.inner.notifications.subscribe()
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        *self.inner.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<AuthorizationStatus> {
        self.inner.status.subscribe()
    }

    pub fn session(&self) -> Option<RelaySession> {
        self.lock_state().session.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock_state().session.as_ref().map(|s| s.session_id.clone())
    }

    pub fn is_player_authorized(&self, player_id: &PlayerId) -> bool {
        self.lock_state().authorized.contains(player_id)
    }

    pub fn is_waiting(&self) -> bool {
        self.inner.wait.is_running()
    }

    fn notify(&self, notification: RelayNotification) {
        let _ = self.inner.notifications.send(notification);
    }

    fn set_status(&self, status: AuthorizationStatus) {
        self.inner.status.send_replace(status);
    }

    async fn handle_lobby_notification(&self, notification: LobbyNotification) {
        let local_id = self.inner.lobby.local_player_id().clone();

        match notification {
            LobbyNotification::Hosted { lobby, migrated } => {
                self.stop_authorization_wait();
                self.lock_state().authorized.clear();
                if migrated {
                    self.adopt_published_session(&lobby).await;
                }
                self.authorize_pending_players(&lobby).await;
            }
            LobbyNotification::HostEnded { .. } => {
                self.lock_state().authorized.clear();
            }
            LobbyNotification::Joined(lobby) | LobbyNotification::Updated(lobby) => {
                if lobby.is_host(&local_id) {
                    self.authorize_pending_players(&lobby).await;
                } else {
                    self.observe_session_id(&lobby);
                }
            }
            LobbyNotification::PlayerLeft { player, .. } => {
                if self.inner.lobby.is_local_player_host() {
                    self.revoke_player(&player).await;
                }
            }
            LobbyNotification::Left { .. } | LobbyNotification::Kicked { .. } => {
                self.clear_session();
            }
            LobbyNotification::LobbiesLoaded(_) | LobbyNotification::EventConnectionChanged(_) => {}
        }
    }

    // ===== Host side =====

    /// Create a relay session for `ips`, wait until it is ready and
    /// publish its id to the lobby (host only)
    pub async fn start_session(&self, ips: Vec<String>) -> Result<RelaySession> {
        if !self.inner.lobby.is_local_player_host() {
            return Err(SessionError::NotHost);
        }

        let config = self.inner.lobby.config().clone();
        let deadline = Instant::now() + config.relay_ready_timeout();

        let created = timeout_at(deadline, self.inner.relay.create_session(&ips))
            .await
            .map_err(|_| {
                warn!(ips = ips.len(), "❌ Relay session creation timed out");
                RelayError::SessionNotReady(String::new())
            })??;
        info!(session = %created.session_id, ips = ips.len(), "🛰️ Relay session created");

        let mut session = created;
        while !session.ready {
            if Instant::now() >= deadline {
                warn!(session = %session.session_id, "❌ Relay session never became ready");
                return Err(RelayError::SessionNotReady(session.session_id).into());
            }
            let wake = (Instant::now() + config.relay_ready_poll_interval()).min(deadline);
            tokio::time::sleep_until(wake).await;

            match timeout_at(deadline, self.inner.relay.get_session(&session.session_id)).await {
                Ok(Ok(fresh)) => session = fresh,
                Ok(Err(e)) => debug!(session = %session.session_id, error = %e, "Relay session poll failed"),
                Err(_) => debug!(session = %session.session_id, "Relay session poll hit the deadline"),
            }
        }

        self.set_session(session.clone());
        self.inner
            .lobby
            .set_lobby_data_values([(keys::RELAY_SESSION_ID, session.session_id.clone())])
            .await?;

        info!(session = %session.session_id, "📣 Relay session published to lobby");
        Ok(session)
    }

    /// Take over `session` and mark every member whose IP it already
    /// authorizes
    pub fn set_session(&self, session: RelaySession) {
        let lobby = self.inner.lobby.lobby();
        let mut state = self.lock_state();

        state.authorized.clear();
        if let Some(lobby) = lobby {
            for player in lobby.players() {
                if public_ip(player).is_some_and(|ip| session.is_authorized(&ip)) {
                    state.authorized.insert(player.id().clone());
                }
            }
        }
        state.last_session_id = session.session_id.clone();
        state.session = Some(session);
    }

    /// After migration, pick up the session the previous host published
    async fn adopt_published_session(&self, lobby: &Lobby) {
        let Some(session_id) = lobby
            .data_value(keys::RELAY_SESSION_ID)
            .filter(|id| !id.is_empty())
        else {
            return;
        };

        match self.inner.relay.get_session(session_id).await {
            Ok(session) => {
                info!(session = %session.session_id, "🛰️ Adopted relay session after migration");
                self.set_session(session);
            }
            Err(e) => warn!(session = session_id, error = %e, "⚠️ Could not fetch relay session"),
        }
    }

    /// Authorize every member with a published IP not yet authorized
    ///
    /// Players are marked before the remote call so overlapping updates
    /// never authorize the same player twice; a failed call unmarks them.
    pub async fn authorize_pending_players(&self, lobby: &Lobby) {
        let (session_id, pending) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let Some(session) = state.session.as_ref() else {
                return;
            };

            let mut pending = Vec::new();
            for player in lobby.players() {
                let Some(ip) = public_ip(player) else {
                    continue;
                };
                if !state.authorized.insert(player.id().clone()) {
                    continue;
                }
                if !session.is_authorized(&ip) {
                    pending.push((player.id().clone(), ip));
                }
            }
            (session.session_id.clone(), pending)
        };

        if pending.is_empty() {
            return;
        }

        let relay = &self.inner.relay;
        let results = join_all(
            pending
                .iter()
                .map(|(_, ip)| relay.authorize_user(&session_id, ip)),
        )
        .await;

        let mut state = self.lock_state();
        for ((player_id, ip), result) in pending.into_iter().zip(results) {
            match result {
                Ok(user) => {
                    info!(player = %player_id, ip = %ip, "🔑 Player authorized on relay");
                    if let Some(session) = state
                        .session
                        .as_mut()
                        .filter(|s| s.session_id == session_id)
                    {
                        session.upsert_user(user);
                    }
                }
                Err(e) => {
                    warn!(player = %player_id, error = %e, "⚠️ Relay authorization failed");
                    state.authorized.remove(&player_id);
                }
            }
        }
    }

    /// Revoke a departed member's relay access
    pub async fn revoke_player(&self, player: &Player) {
        let target = {
            let mut state = self.lock_state();
            state.authorized.remove(player.id());

            let Some(session) = state.session.as_ref() else {
                return;
            };
            public_ip(player).and_then(|ip| {
                session
                    .authorization_token(&ip)
                    .map(|token| (session.session_id.clone(), ip, token))
            })
        };

        let Some((session_id, ip, token)) = target else {
            debug!(player = %player.id(), "No relay token to revoke");
            return;
        };

        match self.inner.relay.remove_user(&session_id, token).await {
            Ok(()) => {
                info!(player = %player.id(), "🔒 Relay access revoked");
                if let Some(session) = self.lock_state().session.as_mut() {
                    session.remove_user(&ip);
                }
            }
            Err(e) => warn!(player = %player.id(), error = %e, "⚠️ Relay revoke failed"),
        }
    }

    // ===== Client side =====

    fn observe_session_id(&self, lobby: &Lobby) {
        let session_id = lobby
            .data_value(keys::RELAY_SESSION_ID)
            .unwrap_or_default()
            .to_string();

        {
            let mut state = self.lock_state();
            if state.last_session_id == session_id {
                return;
            }
            debug!(from = %state.last_session_id, to = %session_id, "Relay session id changed");
            state.last_session_id = session_id.clone();
        }

        if session_id.is_empty() {
            return;
        }

        info!(session = %session_id, "🛰️ Relay session id received");
        self.notify(RelayNotification::SessionIdReceived(session_id.clone()));
        self.start_authorization_wait(session_id);
    }

    /// (Re)start the bounded wait for the local IP to be authorized
    ///
    /// Ends with exactly one of `ClientReadyToConnect` or
    /// `ClientAuthorizationFailed`, unless cancelled first.
    pub fn start_authorization_wait(&self, session_id: String) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.wait.restart(move |token| async move {
            let Some(coordinator) = RelayAuthorizationCoordinator::upgrade(&weak) else {
                return;
            };

            let authorized = coordinator.wait_for_authorization(&session_id, &token).await;
            if token.is_cancelled() {
                return;
            }

            match authorized {
                Some(session) => {
                    info!(session = %session_id, "✅ Relay authorization confirmed");
                    coordinator.lock_state().session = Some(session);
                    coordinator.set_status(AuthorizationStatus::Ready);
                    coordinator.notify(RelayNotification::ClientReadyToConnect { session_id });
                }
                None => {
                    error!(session = %session_id, "❌ Relay authorization timed out");
                    coordinator.set_status(AuthorizationStatus::Failed);
                    coordinator.notify(RelayNotification::ClientAuthorizationFailed { session_id });
                }
            }
        });
    }

    pub fn stop_authorization_wait(&self) -> bool {
        let stopped = self.inner.wait.stop();
        if stopped {
            self.set_status(AuthorizationStatus::Idle);
        }
        stopped
    }

    /// Poll until the local IP is authorized; `None` on timeout or cancel
    ///
    /// One deadline covers both waiting for the local IP and polling the
    /// relay.
    async fn wait_for_authorization(
        &self,
        session_id: &str,
        token: &CancellationToken,
    ) -> Option<RelaySession> {
        let config = self.inner.lobby.config().clone();
        let deadline = Instant::now() + config.authorization_timeout();
        let poll = config.authorization_poll_interval();

        self.set_status(AuthorizationStatus::WaitingForLocalIp);
        let local_ip = loop {
            if let Some(ip) = self.inner.lobby.local_player().as_ref().and_then(public_ip) {
                break ip;
            }
            if !pause_until_next_poll(poll, deadline, token).await {
                return None;
            }
        };

        debug!(session = session_id, ip = %local_ip, "🔎 Local IP published, polling relay");
        self.set_status(AuthorizationStatus::PollingAuthorization);

        loop {
            let cached = self
                .lock_state()
                .session
                .clone()
                .filter(|s| s.session_id == session_id && s.is_authorized(&local_ip));
            if cached.is_some() {
                return cached;
            }

            let fetched = tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep_until(deadline) => return None,
                fetched = self.inner.relay.get_session(session_id) => fetched,
            };
            match fetched {
                Ok(session) if session.is_authorized(&local_ip) => return Some(session),
                Ok(_) => debug!(session = session_id, "Not authorized yet"),
                Err(e) => debug!(session = session_id, error = %e, "Relay poll failed"),
            }

            if !pause_until_next_poll(poll, deadline, token).await {
                return None;
            }
        }
    }

    /// Forget the relay session, e.g. after leaving the lobby
    pub fn clear_session(&self) {
        self.inner.wait.stop();
        *self.lock_state() = RelayState::default();
        self.set_status(AuthorizationStatus::Idle);
        debug!("Relay session state cleared");
    }
}

/// Published public IP of a player, if any
fn public_ip(player: &Player) -> Option<String> {
    player
        .data_value(keys::PUBLIC_IP)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Sleep one poll period, capped at `deadline`
///
/// Returns `false` when the deadline passed or the wait was cancelled.
async fn pause_until_next_poll(
    poll: std::time::Duration,
    deadline: Instant,
    token: &CancellationToken,
) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }

    let wake = (now + poll).min(deadline);
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep_until(wake) => true,
    }
}

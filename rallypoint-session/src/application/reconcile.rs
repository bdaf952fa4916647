//! Applies the directory's change feed to the cached lobby snapshot.

use crate::application::coordinator::LobbyCoordinator;
use crate::application::notifications::LobbyNotification;
use crate::application::runtime::RequestType;
use crate::domain::{LeaveReason, SessionRole};
use crate::infrastructure::directory::DirectoryResult;
use rallypoint_core::{Lobby, LobbyChange, LobbyEvent, LobbyId};
use tracing::{debug, error, info, instrument, warn};

impl LobbyCoordinator {
    /// Handle one event from the lobby feed
    ///
    /// Called by the single event consumer, in arrival order.
    #[instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn process_event(&self, event: LobbyEvent) {
        match event {
            LobbyEvent::LobbyChanged(change) => self.on_lobby_changed(change).await,
            LobbyEvent::PlayerDataAdded { player_id, keys }
            | LobbyEvent::PlayerDataChanged { player_id, keys } => {
                debug!(player = %player_id, ?keys, "Player data event");
                if let Some(lobby) = self.lobby() {
                    self.notify(LobbyNotification::Updated(lobby));
                }
            }
            LobbyEvent::KickedFromLobby => self.on_kicked(),
            LobbyEvent::ConnectionStateChanged(state) => {
                info!(%state, "📡 Lobby event connection changed");
                self.notify(LobbyNotification::EventConnectionChanged(state));
            }
        }
    }

    async fn on_lobby_changed(&self, change: LobbyChange) {
        let Some(current) = self.lobby() else {
            debug!("Change event without a cached lobby, ignoring");
            return;
        };

        if change.lobby_deleted {
            info!(lobby = %current.id(), "🗑️ Lobby deleted by the directory");
            self.inner.loops.stop_lobby_loops();
            self.finish_leave(current.id(), LeaveReason::Deleted);
            return;
        }

        let next = if change.follows(&current) {
            let mut next = current.clone();
            change.apply_to(&mut next);
            next
        } else {
            warn!(
                cached = current.version(),
                received = change.version,
                "⚠️ Version gap, re-fetching lobby"
            );
            match self.fetch_lobby(current.id()).await {
                Ok(lobby) => lobby,
                Err(e) => {
                    warn!(lobby = %current.id(), error = %e, "❌ Re-fetch failed, keeping cached lobby");
                    return;
                }
            }
        };

        self.adopt_snapshot(&current, next);
    }

    /// Rate-limited full read of the lobby
    pub(crate) async fn fetch_lobby(&self, lobby_id: &LobbyId) -> DirectoryResult<Lobby> {
        self.inner.limiters.get(RequestType::Get).acquire().await;
        self.inner.directory.get_lobby(lobby_id).await
    }

    /// Replace the cached snapshot with `next` and react to the difference
    fn adopt_snapshot(&self, previous: &Lobby, next: Lobby) {
        if let Err(e) = next.validate() {
            error!(lobby = %next.id(), error = %e, "❌ Rejecting invalid lobby snapshot");
            return;
        }

        if next.player(self.local_player_id()).is_none() {
            error!(
                lobby = %next.id(),
                player = %self.local_player_id(),
                "❌ Local player missing from snapshot, ignoring"
            );
            return;
        }

        {
            let mut state = self.inner.lock_state();
            let Some(cached) = state.lobby.as_ref() else {
                return;
            };
            // The session moved on while we were fetching
            if cached.id() != next.id() || cached.version() > next.version() {
                debug!(
                    cached = cached.version(),
                    next = next.version(),
                    "Discarding outdated snapshot"
                );
                return;
            }
            state.lobby = Some(next.clone());
        }

        for player in previous.players_missing_from(&next) {
            if player.id() == self.local_player_id() {
                continue;
            }
            info!(lobby = %next.id(), player = %player.id(), "👋 Player left");
            self.notify(LobbyNotification::PlayerLeft {
                lobby_id: next.id().clone(),
                player,
            });
        }

        self.sync_host_role(&next);
        self.notify(LobbyNotification::Updated(next));
    }

    /// Follow host changes in the snapshot
    fn sync_host_role(&self, lobby: &Lobby) {
        let is_host = lobby.is_host(self.local_player_id());
        let role = self.role();

        if is_host && role == SessionRole::Joined && self.inner.config.enable_host_migration {
            self.become_host(lobby);
        } else if !is_host && role == SessionRole::Hosting {
            self.relinquish_host(lobby);
        }
    }

    /// Adopt an existing lobby as host after migration
    ///
    /// Idempotent: a repeated notification finds the role already
    /// `Hosting` and does nothing.
    fn become_host(&self, lobby: &Lobby) {
        {
            let mut state = self.inner.lock_state();
            if state.role != SessionRole::Joined {
                return;
            }
            state.role = SessionRole::Hosting;
        }

        self.start_host_loops();
        info!(lobby = %lobby.id(), "👑 Host migrated to local player");
        self.notify(LobbyNotification::Hosted {
            lobby: lobby.clone(),
            migrated: true,
        });
    }

    fn relinquish_host(&self, lobby: &Lobby) {
        {
            let mut state = self.inner.lock_state();
            if state.role != SessionRole::Hosting {
                return;
            }
            state.role = SessionRole::Joined;
        }

        self.stop_host_loops();
        info!(lobby = %lobby.id(), host = %lobby.host_id(), "🔄 Host moved to another player");
        self.notify(LobbyNotification::HostEnded {
            lobby_id: lobby.id().clone(),
        });
    }

    fn on_kicked(&self) {
        let Some(lobby_id) = self.lobby_id() else {
            return;
        };

        warn!(lobby = %lobby_id, "🚫 Kicked from lobby");
        self.inner.loops.stop_lobby_loops();

        {
            let mut state = self.inner.lock_state();
            if state.lobby_id() != Some(&lobby_id) {
                return;
            }
            state.clear();
        }

        self.notify(LobbyNotification::Kicked { lobby_id });
    }
}

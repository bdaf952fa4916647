//! Liveness loops: host keep-alive, self heartbeat and the stale-peer sweep.
//!
//! Peers publish their wall-clock time under [`keys::HEARTBEAT_EPOCH`]; the
//! host periodically evicts members whose timestamp is too old.

use crate::application::coordinator::{CoordinatorInner, LobbyCoordinator};
use crate::application::runtime::RequestType;
use crate::infrastructure::directory::PlayerUpdate;
use rallypoint_core::{keys, liveness, PlayerId};
use std::collections::HashSet;
use std::sync::Weak;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl LobbyCoordinator {
    /// Start the loops every member runs
    pub(crate) fn start_member_loops(&self) {
        let heartbeat = self.downgrade();
        self.inner
            .loops
            .heartbeat
            .start(move |token| heartbeat_loop(heartbeat, token));
    }

    /// Start keep-alive and watchdog; no-op for loops already running
    pub(crate) fn start_host_loops(&self) {
        let keepalive = self.downgrade();
        self.inner
            .loops
            .keepalive
            .start(move |token| keepalive_loop(keepalive, token));

        let watchdog = self.downgrade();
        self.inner
            .loops
            .watchdog
            .start(move |token| watchdog_loop(watchdog, token));
    }

    pub(crate) fn stop_host_loops(&self) {
        self.inner.loops.keepalive.stop();
        self.inner.loops.watchdog.stop();
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.inner.loops.heartbeat.is_running()
    }

    pub fn is_keepalive_running(&self) -> bool {
        self.inner.loops.keepalive.is_running()
    }

    pub fn is_watchdog_running(&self) -> bool {
        self.inner.loops.watchdog.is_running()
    }

    /// Write the local heartbeat timestamp
    ///
    /// The first beat waits for a slot; later beats are skipped when the
    /// limiter is cooling down. Returns `false` once the lobby is gone.
    async fn beat(&self, blocking: bool, token: &CancellationToken) -> bool {
        let Some(lobby_id) = self.lobby_id() else {
            return false;
        };

        let limiter = self.inner.limiters.get(RequestType::UpdatePlayer);
        if blocking {
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = limiter.acquire() => {}
            }
        } else if !limiter.try_acquire() {
            debug!("💓 Heartbeat skipped, update budget spent");
            return true;
        }

        let now = self.inner.clock.now_unix_secs();
        let update = PlayerUpdate::default().with_data(keys::HEARTBEAT_EPOCH, now.to_string());

        match self
            .inner
            .directory
            .update_player(&lobby_id, self.local_player_id(), update)
            .await
        {
            Ok(_) => debug!(lobby = %lobby_id, epoch = now, "💓 Heartbeat written"),
            Err(e) => warn!(lobby = %lobby_id, error = %e, "⚠️ Heartbeat write failed"),
        }
        true
    }

    /// Evict every stale member of the hosted lobby once
    ///
    /// `evicting` holds removals already issued so a slow directory never
    /// sees the same player twice. Returns `false` when no longer hosting.
    async fn sweep(&self, evicting: &mut HashSet<PlayerId>, token: &CancellationToken) -> bool {
        let Some(lobby) = self.hosted_lobby() else {
            return false;
        };

        evicting.retain(|id| lobby.player(id).is_some());

        let now = self.inner.clock.now_unix_secs();
        let stale = liveness::stale_players(
            &lobby,
            self.local_player_id(),
            now,
            self.inner.config.heartbeat_timeout_secs(),
        );

        for player_id in stale {
            if !evicting.insert(player_id.clone()) {
                continue;
            }

            tokio::select! {
                _ = token.cancelled() => return false,
                _ = self.inner.limiters.get(RequestType::RemovePlayer).acquire() => {}
            }

            info!(lobby = %lobby.id(), player = %player_id, "💀 Evicting stale player");
            if let Err(e) = self.inner.directory.remove_player(lobby.id(), &player_id).await {
                warn!(player = %player_id, error = %e, "⚠️ Eviction failed, retrying next sweep");
                evicting.remove(&player_id);
            }
        }

        true
    }
}

async fn heartbeat_loop(weak: Weak<CoordinatorInner>, token: CancellationToken) {
    let Some(period) = LobbyCoordinator::upgrade(&weak).map(|c| c.config().heartbeat_interval()) else {
        return;
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first_beat = true;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(coordinator) = LobbyCoordinator::upgrade(&weak) else {
            break;
        };

        if !coordinator.beat(first_beat, &token).await {
            break;
        }
        first_beat = false;
    }
}

async fn keepalive_loop(weak: Weak<CoordinatorInner>, token: CancellationToken) {
    let Some(period) = LobbyCoordinator::upgrade(&weak).map(|c| c.config().lobby_ping_interval()) else {
        return;
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(coordinator) = LobbyCoordinator::upgrade(&weak) else {
            break;
        };
        let Some(lobby) = coordinator.hosted_lobby() else {
            debug!("No longer hosting, keep-alive stops");
            break;
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = coordinator.inner.limiters.get(RequestType::Heartbeat).acquire() => {}
        }

        match coordinator.inner.directory.send_heartbeat_ping(lobby.id()).await {
            Ok(()) => debug!(lobby = %lobby.id(), "🏓 Keep-alive sent"),
            Err(e) => warn!(lobby = %lobby.id(), error = %e, "⚠️ Keep-alive failed"),
        }
    }
}

async fn watchdog_loop(weak: Weak<CoordinatorInner>, token: CancellationToken) {
    let Some(period) = LobbyCoordinator::upgrade(&weak).map(|c| c.config().watchdog_interval()) else {
        return;
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut evicting = HashSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(coordinator) = LobbyCoordinator::upgrade(&weak) else {
            break;
        };

        if !coordinator.sweep(&mut evicting, &token).await {
            debug!("No longer hosting, watchdog stops");
            break;
        }
    }
}

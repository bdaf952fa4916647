//! Gathers every member's public IP through lobby metadata.
//!
//! The host flips the lobby's lookup state to `RequestingInfo`; each member
//! reacts to that transition by publishing its address as player data.

use crate::application::coordinator::LobbyCoordinator;
use crate::application::notifications::LobbyNotification;
use crate::application::runtime::LoopSlot;
use crate::infrastructure::error::{Result, SessionError};
use crate::infrastructure::ip_provider::IpProvider;
use rallypoint_core::{keys, Lobby, LobbyIpLookupState};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct IpLookupInner {
    lobby: LobbyCoordinator,
    ip_provider: Arc<dyn IpProvider>,
    /// Lookup state last seen in the lobby
    observed: Mutex<LobbyIpLookupState>,
    listener: LoopSlot,
}

#[derive(Clone)]
pub struct LobbyIpLookup {
    inner: Arc<IpLookupInner>,
}

impl LobbyIpLookup {
    pub fn new(lobby: LobbyCoordinator, ip_provider: Arc<dyn IpProvider>) -> Self {
        Self {
            inner: Arc::new(IpLookupInner {
                lobby,
                ip_provider,
                observed: Mutex::new(LobbyIpLookupState::Idle),
                listener: LoopSlot::new("ip-lookup-listener"),
            }),
        }
    }

    fn upgrade(weak: &Weak<IpLookupInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn lock_observed(&self) -> MutexGuard<'_, LobbyIpLookupState> {
        self.inner
            .observed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lookup state last observed in the lobby
    pub fn observed_state(&self) -> LobbyIpLookupState {
        *self.lock_observed()
    }

    /// Start reacting to lobby notifications; `false` if already attached
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
                        warn!(skipped, "⚠️ IP lookup listener lagged behind lobby notifications");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(lookup) = LobbyIpLookup::upgrade(&weak) else {
                    break;
                };
                lookup.handle_lobby_notification(notification).await;
            }
        })
    }

    pub fn detach(&self) -> bool {
        self.inner.listener.stop()
    }

    async fn handle_lobby_notification(&self, notification: LobbyNotification) {
        match notification {
            LobbyNotification::Hosted {
                lobby,
                migrated: false,
            } => {
                self.observe(&lobby);
                if let Err(e) = self.publish_state(LobbyIpLookupState::Idle).await {
                    warn!(error = %e, "⚠️ Could not reset IP lookup state");
                }
            }
            LobbyNotification::Hosted { lobby, .. }
            | LobbyNotification::Joined(lobby)
            | LobbyNotification::Updated(lobby) => self.observe(&lobby),
            LobbyNotification::Left { .. } | LobbyNotification::Kicked { .. } => {
                *self.lock_observed() = LobbyIpLookupState::Idle;
            }
            _ => {}
        }
    }

    /// Track the lobby's lookup state and answer a fresh request
    fn observe(&self, lobby: &Lobby) {
        let state = lookup_state(lobby);

        let previous = {
            let mut observed = self.lock_observed();
            if *observed == state {
                return;
            }
            std::mem::replace(&mut *observed, state)
        };

        debug!(from = %previous, to = %state, "IP lookup state changed");

        if state == LobbyIpLookupState::RequestingInfo {
            let lookup = self.clone();
            tokio::spawn(async move {
                if let Err(e) = lookup.publish_public_ip().await {
                    error!(error = %e, "❌ Could not publish public IP");
                }
            });
        }
    }

    /// Resolve the local public IP and store it as player data
    pub async fn publish_public_ip(&self) -> Result<String> {
        let ip = self.inner.ip_provider.public_ip().await?;

        if self.inner.lobby.local_player().is_none() {
            return Err(SessionError::NotInLobby);
        }

        self.inner
            .lobby
            .set_player_data_values([(keys::PUBLIC_IP, ip.clone())])
            .await?;

        info!(ip = %ip, "🌐 Public IP published");
        Ok(ip)
    }

    async fn publish_state(&self, state: LobbyIpLookupState) -> Result<()> {
        self.inner
            .lobby
            .set_lobby_data_values([(keys::LOBBY_IP_LOOKUP_STATE, state.as_str())])
            .await
    }

    /// Ask every member for its public IP and wait for all of them (host only)
    ///
    /// On timeout the lookup state stays `RequestingInfo`.
    pub async fn collect_lobby_ips(&self) -> Result<Vec<String>> {
        if !self.inner.lobby.is_local_player_host() {
            error!("❌ Only the host can collect lobby IPs");
            return Err(SessionError::NotHost);
        }

        let config = self.inner.lobby.config().clone();
        self.publish_state(LobbyIpLookupState::RequestingInfo).await?;
        info!("🔎 Requested public IPs from lobby members");

        let start = Instant::now();
        loop {
            tokio::time::sleep(config.ip_lookup_poll_interval()).await;

            let Some(lobby) = self.inner.lobby.lobby() else {
                error!("❌ Lobby gone while collecting IPs");
                return Err(SessionError::NotInLobby);
            };

            let ips: Vec<String> = lobby
                .players()
                .iter()
                .filter_map(|p| p.data_value(keys::PUBLIC_IP))
                .map(str::to_string)
                .collect();

            let missing = lobby.players().len() - ips.len();
            if missing == 0 {
                info!(count = ips.len(), "✅ Received every public IP");
                if let Err(e) = self.publish_state(LobbyIpLookupState::Complete).await {
                    warn!(error = %e, "⚠️ Could not mark IP lookup complete");
                }
                return Ok(ips);
            }

            if start.elapsed() > config.ip_lookup_timeout() {
                warn!(missing, "⏰ Timed out waiting for public IPs");
                return Err(SessionError::IpCollectionTimeout { missing });
            }
        }
    }
}

/// Lookup state stored in lobby data; absent or unknown reads as `Idle`
fn lookup_state(lobby: &Lobby) -> LobbyIpLookupState {
    lobby
        .data_value(keys::LOBBY_IP_LOOKUP_STATE)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rallypoint_core::{DataObject, LobbyId, Player, PlayerId};
    use std::collections::HashMap;

    fn lobby_with_state(state: Option<&str>) -> Lobby {
        let mut data = HashMap::new();
        if let Some(state) = state {
            data.insert(
                keys::LOBBY_IP_LOOKUP_STATE.to_string(),
                DataObject::member(state),
            );
        }
        Lobby::new(LobbyId::new("l"), "test", "CODE", Player::new(PlayerId::new("h"))).with_data(data)
    }

    #[test]
    fn test_lookup_state_defaults_to_idle() {
        assert_eq!(lookup_state(&lobby_with_state(None)), LobbyIpLookupState::Idle);
        assert_eq!(lookup_state(&lobby_with_state(Some("bogus"))), LobbyIpLookupState::Idle);
        assert_eq!(
            lookup_state(&lobby_with_state(Some("RequestingInfo"))),
            LobbyIpLookupState::RequestingInfo
        );
    }
}

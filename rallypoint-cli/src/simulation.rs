//! End-to-end lobby session driven against the in-memory collaborators.
//!
//! Walks one host and `clients` peers through hosting, joining, IP
//! collection, relay authorization, readiness, stale-peer eviction and the
//! host leaving, logging every step.

use crate::infrastructure::error::{CliError, Result};
use rallypoint_core::{Clock, PlayerId, SystemClock};
use rallypoint_session::{
    AuthorizationStatus, LobbyCoordinator, LobbyCoordinatorBuilder, LobbyIpLookup,
    MemoryLobbyService, MemoryRelay, RelayAuthorizationCoordinator, SessionConfig, SessionRole,
    StaticIpProvider,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Wall clock that follows the tokio clock, so a paused runtime moves
/// heartbeat timestamps too
#[derive(Debug)]
pub struct RuntimeClock {
    start_secs: u64,
    origin: Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self {
            start_secs: SystemClock.now_unix_secs(),
            origin: Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now_unix_secs(&self) -> u64 {
        self.start_secs + self.origin.elapsed().as_secs()
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub clients: usize,
    pub host_migration: bool,
    pub config: SessionConfig,
}

impl SimulationOptions {
    /// Short timings so a full run takes seconds
    pub fn new(clients: usize) -> Self {
        Self {
            clients,
            host_migration: false,
            config: SessionConfig::default()
                .with_heartbeat(2, 6)
                .with_watchdog_interval(1000)
                .with_authorization(10, 250)
                .with_ip_lookup(10, 50),
        }
    }

    pub fn with_host_migration(mut self, enabled: bool) -> Self {
        self.host_migration = enabled;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Config actually used: migration flag applied, lobby big enough
    fn effective_config(&self) -> SessionConfig {
        let mut config = self.config.clone().with_host_migration(self.host_migration);
        let needed = self.clients + 1;
        if config.max_lobby_size < needed {
            warn!(
                configured = config.max_lobby_size,
                needed, "⚠️ Raising max lobby size to fit every simulated peer"
            );
            config = config.with_max_lobby_size(needed);
        }
        config
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub lobby_code: String,
    pub collected_ips: Vec<String>,
    pub relay_session_id: String,
    pub ready_clients: Vec<String>,
    pub failed_clients: Vec<String>,
    pub evicted: Vec<String>,
    pub new_host: Option<String>,
    pub lobby_deleted: bool,
    pub relay_authorizations: usize,
    pub relay_revocations: usize,
}

/// One simulated peer with its lobby, relay and IP lookup coordinators
struct Peer {
    lobby: LobbyCoordinator,
    relay: RelayAuthorizationCoordinator,
    ip_lookup: LobbyIpLookup,
}

struct Backend {
    service: MemoryLobbyService,
    relay: MemoryRelay,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl Backend {
    fn peer(&self, name: &str, ip: String) -> Result<Peer> {
        let player_id = PlayerId::new(name);
        let lobby = LobbyCoordinatorBuilder::new(player_id.clone(), self.service.directory(&player_id))
            .config(self.config.clone())
            .display_name(name)
            .clock(self.clock.clone())
            .build()?;

        let relay = RelayAuthorizationCoordinator::new(lobby.clone(), Arc::new(self.relay.clone()));
        let ip_lookup = LobbyIpLookup::new(lobby.clone(), Arc::new(StaticIpProvider::new(ip)));
        relay.attach();
        ip_lookup.attach();

        Ok(Peer {
            lobby,
            relay,
            ip_lookup,
        })
    }
}

fn peer_ip(index: usize) -> String {
    format!("198.51.100.{}", index + 1)
}

/// Run a full session and report what happened
#[instrument(skip(options), fields(clients = options.clients, migration = options.host_migration))]
pub async fn run(options: SimulationOptions) -> Result<SimulationReport> {
    let config = options.effective_config();
    config.validate()?;

    let backend = Backend {
        service: MemoryLobbyService::new(),
        relay: MemoryRelay::new(),
        clock: Arc::new(RuntimeClock::new()),
        config: config.clone(),
    };
    let mut report = SimulationReport::default();

    // Host and clients
    let host = backend.peer("host", peer_ip(0))?;
    let lobby = host.lobby.host_lobby(HashMap::new(), false).await?;
    let lobby_id = lobby.id().clone();
    report.lobby_code = lobby.lobby_code().to_string();
    info!(code = %report.lobby_code, "🏠 Lobby hosted");

    let mut clients = Vec::with_capacity(options.clients);
    for i in 1..=options.clients {
        let client = backend.peer(&format!("client-{i}"), peer_ip(i))?;
        client.lobby.join_lobby_by_code(&report.lobby_code).await?;
        info!(player = %client.lobby.local_player_id(), "👋 Client joined");
        clients.push(client);
    }

    // Public IPs and relay session
    report.collected_ips = host.ip_lookup.collect_lobby_ips().await?;
    info!(ips = ?report.collected_ips, "🌐 Collected lobby IPs");

    let session = host.relay.start_session(report.collected_ips.clone()).await?;
    report.relay_session_id = session.session_id;

    let budget = config.authorization_timeout() + Duration::from_secs(1);
    for client in &clients {
        let player = client.lobby.local_player_id().to_string();
        match wait_for_authorization(&client.relay, budget).await {
            AuthorizationStatus::Ready => {
                client.lobby.set_ready(true).await?;
                info!(player = %player, "✅ Client ready");
                report.ready_clients.push(player);
            }
            status => {
                warn!(player = %player, status = %status, "❌ Client never got relay access");
                report.failed_clients.push(player);
            }
        }
    }

    // A silent client gets evicted by the host watchdog
    if clients.len() >= 2 {
        if let Some(ghost) = clients.pop() {
            let ghost_id = ghost.lobby.local_player_id().clone();
            drop(ghost);
            info!(player = %ghost_id, "👻 Client went silent");

            let budget = Duration::from_secs(config.heartbeat_timeout_secs())
                + config.heartbeat_interval()
                + config.watchdog_interval() * 2;
            if wait_until(budget, || {
                host.lobby
                    .lobby()
                    .is_some_and(|lobby| lobby.player(&ghost_id).is_none())
            })
            .await
            {
                info!(player = %ghost_id, "🧹 Silent client evicted");
                report.evicted.push(ghost_id.to_string());
            } else {
                warn!(player = %ghost_id, "⚠️ Silent client was not evicted in time");
            }
        }
    }

    // Host leaves: migrate or delete
    host.lobby.leave_joined_lobby().await?;
    info!("🚪 Host left the lobby");

    if config.enable_host_migration && !clients.is_empty() {
        let migrated = wait_until(Duration::from_secs(5), || {
            clients.iter().any(|c| c.lobby.role() == SessionRole::Hosting)
        })
        .await;
        if !migrated {
            return Err(CliError::simulation("no client took over as host"));
        }
        report.new_host = clients
            .iter()
            .find(|c| c.lobby.role() == SessionRole::Hosting)
            .map(|c| c.lobby.local_player_id().to_string());
        info!(host = ?report.new_host, "👑 Host migrated");
    }

    report.lobby_deleted = backend.service.lobby(&lobby_id).await.is_none();
    report.relay_authorizations = backend.relay.call_count("authorize_user").await;
    report.relay_revocations = backend.relay.call_count("remove_user").await;

    for client in &clients {
        client.lobby.end_connections_immediately();
    }

    info!(
        ready = report.ready_clients.len(),
        evicted = report.evicted.len(),
        deleted = report.lobby_deleted,
        "🏁 Simulation finished"
    );
    Ok(report)
}

/// Status the client settled on, or the last one seen when `budget` ran out
async fn wait_for_authorization(
    relay: &RelayAuthorizationCoordinator,
    budget: Duration,
) -> AuthorizationStatus {
    let mut changes = relay.status_changes();
    let settled = tokio::time::timeout(
        budget,
        changes.wait_for(|status| {
            matches!(
                status,
                AuthorizationStatus::Ready | AuthorizationStatus::Failed
            )
        }),
    )
    .await;

    match settled {
        Ok(Ok(status)) => *status,
        _ => relay.authorization_status(),
    }
}

/// Poll `condition` every 100ms until it holds or `budget` runs out
async fn wait_until(budget: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_fits_all_peers() {
        let options = SimulationOptions::new(4).with_host_migration(true);
        let config = options.effective_config();

        assert_eq!(config.max_lobby_size, 5);
        assert!(config.enable_host_migration);
        assert!(config.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_follows_tokio_time() {
        let clock = RuntimeClock::new();
        let start = clock.now_unix_secs();

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(clock.now_unix_secs(), start + 30);
    }
}

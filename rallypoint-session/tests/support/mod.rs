#![allow(dead_code)]

use rallypoint_core::{Clock, LobbyId, ManualClock, PlayerId};
use rallypoint_session::{
    LobbyCoordinator, LobbyCoordinatorBuilder, LobbyNotification, MemoryLobbyService,
    SessionConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Wall-clock start used by every fixture
pub const START_EPOCH: u64 = 1_000;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// Let spawned tasks drain their queues (paused time)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Every notification received so far
pub fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut received = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        received.push(item);
    }
    received
}

pub fn count_hosted(notifications: &[LobbyNotification], migrated: bool) -> usize {
    notifications
        .iter()
        .filter(|n| matches!(n, LobbyNotification::Hosted { migrated: m, .. } if *m == migrated))
        .count()
}

/// Shared in-memory directory plus a manual wall clock
pub struct LobbyFixture {
    pub service: MemoryLobbyService,
    pub clock: Arc<ManualClock>,
    pub config: SessionConfig,
}

impl LobbyFixture {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            service: MemoryLobbyService::new(),
            clock: Arc::new(ManualClock::new(START_EPOCH)),
            config,
        }
    }

    /// Coordinator for a new peer named `name`
    pub fn peer(&self, name: &str) -> LobbyCoordinator {
        let player_id = PlayerId::new(name);
        let clock: Arc<dyn Clock> = self.clock.clone();

        LobbyCoordinatorBuilder::new(player_id.clone(), self.service.directory(&player_id))
            .config(self.config.clone())
            .display_name(name)
            .clock(clock)
            .build()
            .expect("valid fixture config")
    }

    /// Host a lobby and join `client_count` peers to it
    pub async fn hosted(&self, client_count: usize) -> (LobbyCoordinator, Vec<LobbyCoordinator>) {
        let host = self.peer("host");
        let lobby = host
            .host_lobby(Default::default(), false)
            .await
            .expect("host lobby");

        let mut clients = Vec::new();
        for i in 0..client_count {
            let client = self.peer(&format!("client-{}", i + 1));
            client
                .join_lobby_by_code(lobby.lobby_code())
                .await
                .expect("join lobby");
            clients.push(client);
        }

        settle().await;
        (host, clients)
    }

    pub fn advance_clock(&self, secs: u64) {
        self.clock.advance(secs);
    }

    pub async fn player_count(&self, lobby_id: &LobbyId) -> usize {
        self.service
            .lobby(lobby_id)
            .await
            .map(|l| l.players().len())
            .unwrap_or(0)
    }
}

use cucumber::World;
use rallypoint_core::{Clock, LobbyId, ManualClock, PlayerId};
use rallypoint_session::{
    LobbyCoordinator, LobbyCoordinatorBuilder, LobbyNotification, MemoryLobbyService,
    MemoryRelay, RateLimiter, RelayAuthorizationCoordinator, RelayNotification, SessionConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wall-clock start of every scenario
pub const START_EPOCH: u64 = 1_000;

#[derive(Debug, World)]
pub struct RallyWorld {
    /// Shared in-memory lobby backend
    pub service: MemoryLobbyService,

    pub relay: MemoryRelay,

    pub clock: Arc<ManualClock>,

    pub config: SessionConfig,

    /// Coordinators by peer name
    pub peers: HashMap<String, LobbyCoordinator>,

    /// Lobby notifications seen by each peer, from the moment it was created
    pub notifications: HashMap<String, broadcast::Receiver<LobbyNotification>>,

    pub relays: HashMap<String, RelayAuthorizationCoordinator>,

    pub relay_notifications: HashMap<String, broadcast::Receiver<RelayNotification>>,

    pub lobby_id: Option<LobbyId>,

    pub limiter: Option<Arc<RateLimiter>>,

    /// How long each acquire waited, in completion order
    pub acquire_delays: Vec<Duration>,

    pub last_error: Option<String>,
}

impl Default for RallyWorld {
    fn default() -> Self {
        Self {
            service: MemoryLobbyService::new(),
            relay: MemoryRelay::new(),
            clock: Arc::new(ManualClock::new(START_EPOCH)),
            config: SessionConfig::default(),
            peers: HashMap::new(),
            notifications: HashMap::new(),
            relays: HashMap::new(),
            relay_notifications: HashMap::new(),
            lobby_id: None,
            limiter: None,
            acquire_delays: Vec::new(),
            last_error: None,
        }
    }
}

impl RallyWorld {
    /// Create a peer coordinator named `name`
    pub fn add_peer(&mut self, name: &str) -> LobbyCoordinator {
        let player_id = PlayerId::new(name);
        let clock: Arc<dyn Clock> = self.clock.clone();

        let peer = LobbyCoordinatorBuilder::new(player_id.clone(), self.service.directory(&player_id))
            .config(self.config.clone())
            .display_name(name)
            .clock(clock)
            .build()
            .expect("valid scenario config");

        self.notifications.insert(name.to_string(), peer.subscribe());
        self.peers.insert(name.to_string(), peer.clone());
        peer
    }

    /// Get a peer by name (panics if unknown)
    pub fn peer(&self, name: &str) -> &LobbyCoordinator {
        self.peers
            .get(name)
            .unwrap_or_else(|| panic!("Peer '{}' not found", name))
    }

    pub fn lobby_id(&self) -> LobbyId {
        self.lobby_id.clone().expect("No lobby hosted yet")
    }

    /// Drain every lobby notification `name` received so far
    pub fn take_notifications(&mut self, name: &str) -> Vec<LobbyNotification> {
        drain(
            self.notifications
                .get_mut(name)
                .unwrap_or_else(|| panic!("Peer '{}' not found", name)),
        )
    }

    pub fn take_relay_notifications(&mut self, name: &str) -> Vec<RelayNotification> {
        drain(
            self.relay_notifications
                .get_mut(name)
                .unwrap_or_else(|| panic!("Relay for '{}' not found", name)),
        )
    }

    /// Let wall clock and timers move forward one second at a time, so
    /// live peers keep beating
    pub async fn pass_secs(&self, secs: u64) {
        for _ in 0..secs {
            self.clock.advance(1);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Let spawned tasks drain their queues
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut received = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        received.push(item);
    }
    received
}

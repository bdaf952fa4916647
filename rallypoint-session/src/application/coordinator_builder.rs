use crate::application::config::SessionConfig;
use crate::application::coordinator::LobbyCoordinator;
use crate::infrastructure::directory::LobbyDirectory;
use crate::infrastructure::error::Result;
use rallypoint_core::{Clock, PlayerId, SystemClock};
use std::sync::Arc;

/// Builder for a [`LobbyCoordinator`]
pub struct LobbyCoordinatorBuilder {
    local_player_id: PlayerId,
    directory: Arc<dyn LobbyDirectory>,
    config: SessionConfig,
    display_name: Option<String>,
    clock: Arc<dyn Clock>,
}

impl LobbyCoordinatorBuilder {
    pub fn new(local_player_id: PlayerId, directory: Arc<dyn LobbyDirectory>) -> Self {
        Self {
            local_player_id,
            directory,
            config: SessionConfig::default(),
            display_name: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Clock used for heartbeat timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build the coordinator
    ///
    /// Nothing is spawned until the coordinator enters a lobby.
    pub fn build(self) -> Result<LobbyCoordinator> {
        self.config.validate()?;

        let display_name = self
            .display_name
            .unwrap_or_else(|| self.local_player_id.to_string());

        tracing::info!(
            player = %self.local_player_id,
            host_migration = self.config.enable_host_migration,
            "🎯 Building lobby coordinator"
        );

        Ok(LobbyCoordinator::from_parts(
            self.config,
            self.local_player_id,
            display_name,
            self.directory,
            self.clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error::SessionError;
    use crate::infrastructure::memory::MemoryLobbyService;

    #[test]
    fn test_build_rejects_invalid_config() {
        let service = MemoryLobbyService::new();
        let player = PlayerId::new("alice");
        let result = LobbyCoordinatorBuilder::new(player.clone(), service.directory(&player))
            .config(SessionConfig::default().with_heartbeat(5, 10))
            .build();

        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_display_name_defaults_to_player_id() {
        let service = MemoryLobbyService::new();
        let player = PlayerId::new("alice");
        let coordinator = LobbyCoordinatorBuilder::new(player.clone(), service.directory(&player))
            .build()
            .unwrap();

        assert_eq!(coordinator.display_name(), "alice");
        assert_eq!(coordinator.role(), crate::domain::SessionRole::Idle);
    }
}

use crate::domain::{DataObject, Lobby, Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Incremental lobby mutation pushed by the directory
///
/// `version` is the lobby version *after* the change. A change may only be
/// applied to a snapshot whose version is exactly `version - 1`; anything
/// else means events were lost or reordered and the snapshot must be
/// re-fetched instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyChange {
    pub version: u64,

    #[serde(default)]
    pub lobby_deleted: bool,

    pub host_id: Option<PlayerId>,
    pub name: Option<String>,
    pub is_private: Option<bool>,
    pub is_locked: Option<bool>,

    #[serde(default)]
    pub players_joined: Vec<Player>,

    #[serde(default)]
    pub players_left: Vec<PlayerId>,

    /// `None` removes the key
    #[serde(default)]
    pub data_changed: HashMap<String, Option<DataObject>>,

    /// Per-player metadata edits, `None` removes the key
    #[serde(default)]
    pub player_data_changed: HashMap<PlayerId, HashMap<String, Option<DataObject>>>,
}

impl LobbyChange {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Change signalling that the lobby no longer exists
    pub fn deleted(version: u64) -> Self {
        Self {
            version,
            lobby_deleted: true,
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host_id: PlayerId) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn with_player_joined(mut self, player: Player) -> Self {
        self.players_joined.push(player);
        self
    }

    pub fn with_player_left(mut self, player_id: PlayerId) -> Self {
        self.players_left.push(player_id);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, data: Option<DataObject>) -> Self {
        self.data_changed.insert(key.into(), data);
        self
    }

    pub fn with_player_data(
        mut self,
        player_id: PlayerId,
        key: impl Into<String>,
        data: Option<DataObject>,
    ) -> Self {
        self.player_data_changed
            .entry(player_id)
            .or_default()
            .insert(key.into(), data);
        self
    }

    pub fn with_locked(mut self, is_locked: bool) -> Self {
        self.is_locked = Some(is_locked);
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }

    /// Does this change follow `lobby` directly?
    pub fn follows(&self, lobby: &Lobby) -> bool {
        lobby.version().checked_add(1) == Some(self.version)
    }

    /// Apply the delta in place and advance the snapshot to `self.version`
    ///
    /// Order: departures, arrivals, host, flags, lobby data, player data.
    /// Edits for players not in the lobby are ignored.
    pub fn apply_to(&self, lobby: &mut Lobby) {
        for player_id in &self.players_left {
            lobby.remove_player(player_id);
        }

        for player in &self.players_joined {
            lobby.upsert_player(player.clone());
        }

        if let Some(host_id) = &self.host_id {
            lobby.set_host(host_id.clone());
        }

        if let Some(name) = &self.name {
            lobby.set_name(name.clone());
        }

        if let Some(is_private) = self.is_private {
            lobby.set_private(is_private);
        }

        if let Some(is_locked) = self.is_locked {
            lobby.set_locked(is_locked);
        }

        for (key, data) in &self.data_changed {
            lobby.set_data(key, data.clone());
        }

        for (player_id, edits) in &self.player_data_changed {
            if let Some(player) = lobby.player_mut(player_id) {
                for (key, data) in edits {
                    player.set_data(key, data.clone());
                }
            }
        }

        lobby.set_version(self.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LobbyId;

    fn lobby() -> Lobby {
        Lobby::new(
            LobbyId::new("l1"),
            "Test Lobby",
            "CODE",
            Player::new(PlayerId::new("host")),
        )
    }

    #[test]
    fn test_follows_only_next_version() {
        let lobby = lobby();

        assert!(LobbyChange::new(2).follows(&lobby));
        assert!(!LobbyChange::new(1).follows(&lobby));
        assert!(!LobbyChange::new(3).follows(&lobby));
    }

    #[test]
    fn test_apply_join_and_data() {
        let mut lobby = lobby();

        LobbyChange::new(2)
            .with_player_joined(Player::new(PlayerId::new("guest")))
            .with_data("RelaySessionId", Some(DataObject::member("s-1")))
            .apply_to(&mut lobby);

        assert_eq!(lobby.version(), 2);
        assert_eq!(lobby.players().len(), 2);
        assert_eq!(lobby.data_value("RelaySessionId"), Some("s-1"));
    }

    #[test]
    fn test_apply_host_migration_with_departure() {
        let mut lobby = lobby();
        LobbyChange::new(2)
            .with_player_joined(Player::new(PlayerId::new("guest")))
            .apply_to(&mut lobby);

        LobbyChange::new(3)
            .with_player_left(PlayerId::new("host"))
            .with_host(PlayerId::new("guest"))
            .apply_to(&mut lobby);

        assert_eq!(lobby.host_id(), &PlayerId::new("guest"));
        assert_eq!(lobby.players().len(), 1);
        assert!(lobby.validate().is_ok());
    }

    #[test]
    fn test_apply_player_data_and_removal() {
        let mut lobby = lobby();
        let host = PlayerId::new("host");

        LobbyChange::new(2)
            .with_player_data(host.clone(), "HeartbeatEpoch", Some(DataObject::member("100")))
            .apply_to(&mut lobby);
        assert_eq!(lobby.player_data_value(&host, "HeartbeatEpoch"), Some("100"));

        LobbyChange::new(3)
            .with_player_data(host.clone(), "HeartbeatEpoch", None)
            .apply_to(&mut lobby);
        assert_eq!(lobby.player_data_value(&host, "HeartbeatEpoch"), None);
    }

    #[test]
    fn test_edits_for_unknown_player_are_ignored() {
        let mut lobby = lobby();

        LobbyChange::new(2)
            .with_player_data(PlayerId::new("stranger"), "PublicIp", Some(DataObject::member("x")))
            .apply_to(&mut lobby);

        assert_eq!(lobby.players().len(), 1);
        assert_eq!(lobby.version(), 2);
    }

    #[test]
    fn test_flags() {
        let mut lobby = lobby();

        LobbyChange::new(2)
            .with_locked(true)
            .with_private(true)
            .apply_to(&mut lobby);

        assert!(lobby.is_locked());
        assert!(lobby.is_private());
    }
}

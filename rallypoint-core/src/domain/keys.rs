//! Well-known metadata keys shared by every peer through the directory.
//!
//! All of them are written with member visibility.

/// Player key: last liveness beat, integer unix seconds as a string
pub const HEARTBEAT_EPOCH: &str = "HeartbeatEpoch";

/// Player key: `"true"` while the player is intentionally paused
pub const IS_SLEEPING: &str = "IsSleeping";

/// Player key: display name
pub const DISPLAY_NAME: &str = "DisplayName";

/// Player key: `"True"` / `"False"`
pub const IS_READY: &str = "isReady";

/// Player key: public IP address as seen from the internet
pub const PUBLIC_IP: &str = "PublicIp";

/// Lobby key: relay session id published by the host
pub const RELAY_SESSION_ID: &str = "RelaySessionId";

/// Lobby key: [`LobbyIpLookupState`](crate::LobbyIpLookupState) of the host-driven IP collection
pub const LOBBY_IP_LOOKUP_STATE: &str = "LobbyIpLookupState";

/// Lobby key: optional relay join code
pub const RELAY_JOIN_CODE: &str = "RelayJoinCode";

/// Encode a flag the way the `isReady` key expects it
pub fn ready_flag(ready: bool) -> &'static str {
    if ready {
        "True"
    } else {
        "False"
    }
}

/// Encode a flag the way the `IsSleeping` key expects it
pub fn sleeping_flag(sleeping: bool) -> &'static str {
    if sleeping {
        "true"
    } else {
        "false"
    }
}

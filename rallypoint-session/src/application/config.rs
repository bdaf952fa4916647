use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest allowed self-heartbeat interval
pub const MIN_HEARTBEAT_INTERVAL_SECS: u64 = 2;

/// Required ratio between heartbeat timeout and interval
pub const HEARTBEAT_TIMEOUT_FACTOR: u64 = 3;

/// Call budget of one remote operation category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LimitSpec {
    /// Calls allowed per window
    pub max_calls: u32,

    /// Window length in seconds, before the ping buffer is added
    pub cool_down_secs: f64,
}

impl LimitSpec {
    pub const fn new(max_calls: u32, cool_down_secs: f64) -> Self {
        Self {
            max_calls,
            cool_down_secs,
        }
    }

    pub fn cool_down(&self) -> Duration {
        Duration::try_from_secs_f64(self.cool_down_secs).unwrap_or(Duration::ZERO)
    }
}

/// Per-operation budgets, defaulting to the directory's published limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Padding added to every window to absorb network latency
    pub ping_buffer_ms: u64,

    pub query: LimitSpec,
    pub create: LimitSpec,
    pub join: LimitSpec,
    pub quick_join: LimitSpec,
    pub get: LimitSpec,
    pub delete: LimitSpec,
    pub update_lobby: LimitSpec,
    pub update_player: LimitSpec,
    pub remove_player: LimitSpec,
    pub heartbeat: LimitSpec,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ping_buffer_ms: 100,
            query: LimitSpec::new(1, 1.0),
            create: LimitSpec::new(2, 6.0),
            join: LimitSpec::new(2, 6.0),
            quick_join: LimitSpec::new(1, 1.0),
            get: LimitSpec::new(1, 1.0),
            delete: LimitSpec::new(2, 1.0),
            update_lobby: LimitSpec::new(5, 5.0),
            update_player: LimitSpec::new(5, 5.0),
            remove_player: LimitSpec::new(5, 1.0),
            heartbeat: LimitSpec::new(1, 1.0),
        }
    }
}

impl RateLimitConfig {
    pub fn ping_buffer(&self) -> Duration {
        Duration::from_millis(self.ping_buffer_ms)
    }

    pub fn with_ping_buffer(mut self, ms: u64) -> Self {
        self.ping_buffer_ms = ms;
        self
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Heartbeat timeout ({timeout}s) must be at least {factor}x the heartbeat interval ({interval}s)")]
    HeartbeatTimeoutTooShort {
        timeout: u64,
        interval: u64,
        factor: u64,
    },

    #[error("Watchdog interval ({watchdog_ms}ms) must be shorter than the heartbeat interval ({interval}s)")]
    WatchdogTooSlow { watchdog_ms: u64, interval: u64 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Max lobby size must be at least 1")]
    EmptyLobbySize,
}

/// Configuration for a lobby session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// Hand the lobby to a remaining member when the host leaves
    pub enable_host_migration: bool,

    /// Host keep-alive ping to the directory, in seconds
    pub lobby_ping_interval_secs: u64,

    /// Self heartbeat interval in seconds (clamped to at least 2)
    pub heartbeat_interval_secs: u64,

    /// Age after which the host evicts a silent player, in seconds
    pub heartbeat_timeout_secs: u64,

    /// Stale-peer sweep interval in milliseconds
    pub watchdog_interval_ms: u64,

    /// Lobby browsing refresh interval in seconds
    pub query_interval_secs: u64,

    pub max_lobby_size: usize,

    /// Budget for the client-side relay authorization wait, in seconds
    pub authorization_timeout_secs: u64,

    pub authorization_poll_interval_ms: u64,

    /// Budget for collecting every member's public IP, in seconds
    pub ip_lookup_timeout_secs: u64,

    pub ip_lookup_poll_interval_ms: u64,

    /// Budget for a freshly created relay session to become ready, in seconds
    pub relay_ready_timeout_secs: u64,

    pub relay_ready_poll_interval_ms: u64,

    pub rate_limits: RateLimitConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enable_host_migration: true,
            lobby_ping_interval_secs: 5,
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            watchdog_interval_ms: 3000,
            query_interval_secs: 5,
            max_lobby_size: 3,
            authorization_timeout_secs: 20,
            authorization_poll_interval_ms: 1000,
            ip_lookup_timeout_secs: 20,
            ip_lookup_poll_interval_ms: 25,
            relay_ready_timeout_secs: 60,
            relay_ready_poll_interval_ms: 3000,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_host_migration(mut self, enabled: bool) -> Self {
        self.enable_host_migration = enabled;
        self
    }

    pub fn with_heartbeat(mut self, interval_secs: u64, timeout_secs: u64) -> Self {
        self.heartbeat_interval_secs = interval_secs;
        self.heartbeat_timeout_secs = timeout_secs;
        self
    }

    pub fn with_watchdog_interval(mut self, ms: u64) -> Self {
        self.watchdog_interval_ms = ms;
        self
    }

    pub fn with_max_lobby_size(mut self, size: usize) -> Self {
        self.max_lobby_size = size;
        self
    }

    pub fn with_authorization(mut self, timeout_secs: u64, poll_interval_ms: u64) -> Self {
        self.authorization_timeout_secs = timeout_secs;
        self.authorization_poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_ip_lookup(mut self, timeout_secs: u64, poll_interval_ms: u64) -> Self {
        self.ip_lookup_timeout_secs = timeout_secs;
        self.ip_lookup_poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Parse a JSON document; missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn lobby_ping_interval(&self) -> Duration {
        Duration::from_secs(self.lobby_ping_interval_secs.max(1))
    }

    /// Effective self heartbeat interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(MIN_HEARTBEAT_INTERVAL_SECS))
    }

    pub fn heartbeat_timeout_secs(&self) -> u64 {
        self.heartbeat_timeout_secs
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_secs.max(1))
    }

    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }

    pub fn authorization_poll_interval(&self) -> Duration {
        Duration::from_millis(self.authorization_poll_interval_ms.max(1))
    }

    pub fn ip_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_lookup_timeout_secs)
    }

    pub fn ip_lookup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ip_lookup_poll_interval_ms.max(1))
    }

    pub fn relay_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_ready_timeout_secs)
    }

    pub fn relay_ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_ready_poll_interval_ms.max(1))
    }

    /// Check the timing relationships the liveness protocol depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.heartbeat_interval().as_secs();

        if self.heartbeat_timeout_secs < interval.saturating_mul(HEARTBEAT_TIMEOUT_FACTOR) {
            return Err(ConfigError::HeartbeatTimeoutTooShort {
                timeout: self.heartbeat_timeout_secs,
                interval,
                factor: HEARTBEAT_TIMEOUT_FACTOR,
            });
        }

        if self.watchdog_interval_ms >= interval.saturating_mul(1000) {
            return Err(ConfigError::WatchdogTooSlow {
                watchdog_ms: self.watchdog_interval_ms,
                interval,
            });
        }

        if self.authorization_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("authorization_timeout_secs"));
        }

        if self.ip_lookup_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("ip_lookup_timeout_secs"));
        }

        if self.max_lobby_size == 0 {
            return Err(ConfigError::EmptyLobbySize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_host_migration);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.watchdog_interval(), Duration::from_secs(3));
        assert_eq!(config.max_lobby_size, 3);
    }

    #[test]
    fn test_heartbeat_interval_is_clamped() {
        let config = SessionConfig::default().with_heartbeat(1, 15);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_must_cover_three_intervals() {
        let config = SessionConfig::default().with_heartbeat(5, 14);
        assert_eq!(
            config.validate(),
            Err(ConfigError::HeartbeatTimeoutTooShort {
                timeout: 14,
                interval: 5,
                factor: 3
            })
        );
    }

    #[test]
    fn test_huge_heartbeat_interval_is_rejected() {
        let config = SessionConfig::default().with_heartbeat(u64::MAX, u64::MAX - 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::HeartbeatTimeoutTooShort {
                timeout: u64::MAX - 1,
                interval: u64::MAX,
                factor: 3
            })
        );
    }

    #[test]
    fn test_watchdog_must_be_faster_than_heartbeat() {
        let config = SessionConfig::default().with_watchdog_interval(5000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WatchdogTooSlow { .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(
            r#"{ "enable_host_migration": false, "rate_limits": { "create": { "max_calls": 4, "cool_down_secs": 2.5 } } }"#,
        )
        .unwrap();

        assert!(!config.enable_host_migration);
        assert_eq!(config.heartbeat_timeout_secs, 15);
        assert_eq!(config.rate_limits.create, LimitSpec::new(4, 2.5));
        assert_eq!(config.rate_limits.join, LimitSpec::new(2, 6.0));
    }

    #[test]
    fn test_negative_cool_down_is_zero() {
        assert_eq!(LimitSpec::new(1, -3.0).cool_down(), Duration::ZERO);
    }
}

pub mod config;
mod coordinator;
mod coordinator_builder;
mod heartbeat;
mod ip_lookup;
pub mod notifications;
mod reconcile;
mod relay_auth;
pub mod runtime;

pub use config::{ConfigError, LimitSpec, RateLimitConfig, SessionConfig};
pub use coordinator::LobbyCoordinator;
pub use coordinator_builder::LobbyCoordinatorBuilder;
pub use ip_lookup::LobbyIpLookup;
pub use notifications::{LobbyNotification, RelayNotification};
pub use relay_auth::{AuthorizationStatus, RelayAuthorizationCoordinator};
pub use runtime::{LoopSlot, RateLimiter, RateLimiters, RequestType};

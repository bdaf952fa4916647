// Domain layer (session bookkeeping)
pub mod domain;

// Application layer (coordinators and loops)
pub mod application;

// Infrastructure layer (directory, relay and IP collaborators)
pub mod infrastructure;

// Re-exports for convenience
pub use application::{
    AuthorizationStatus, ConfigError, LimitSpec, LobbyCoordinator, LobbyCoordinatorBuilder,
    LobbyIpLookup, LobbyNotification, RateLimitConfig, RateLimiter, RequestType,
    RelayAuthorizationCoordinator, RelayNotification, SessionConfig,
};
pub use domain::{LeaveReason, SessionRole, SessionState};
pub use infrastructure::error::{
    DirectoryError, IpLookupError, RelayError, Result, SessionError,
};
pub use infrastructure::{
    IpProvider, LobbyDirectory, MemoryDirectory, MemoryLobbyService, MemoryRelay, RelayClient,
    StaticIpProvider,
};

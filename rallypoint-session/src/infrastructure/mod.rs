pub mod directory;
pub mod error;
pub mod ip_provider;
pub mod memory;
pub mod relay;

pub use directory::{
    CreateLobbyRequest, DirectoryResult, LobbyDirectory, LobbySubscription, LobbyUpdate,
    PlayerUpdate,
};
pub use ip_provider::{IpProvider, StaticIpProvider};
pub use memory::{MemoryDirectory, MemoryLobbyService, MemoryRelay};
pub use relay::{RelayClient, RelayResult};

//! In-process collaborators for simulations and tests.

mod directory;
mod relay;
mod service;

pub use directory::MemoryDirectory;
pub use relay::MemoryRelay;
pub use service::MemoryLobbyService;

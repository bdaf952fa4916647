use crate::infrastructure::error::RelayError;
use async_trait::async_trait;
use rallypoint_core::{RelaySession, SessionUser};

pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Control plane of the relay that forwards traffic between peers
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Allocate a session pre-authorizing `ips`
    async fn create_session(&self, ips: &[String]) -> RelayResult<RelaySession>;

    async fn get_session(&self, session_id: &str) -> RelayResult<RelaySession>;

    /// Authorize one more endpoint; the returned user carries its token
    async fn authorize_user(&self, session_id: &str, ip_address: &str) -> RelayResult<SessionUser>;

    async fn remove_user(&self, session_id: &str, authorization_token: u32) -> RelayResult<()>;
}

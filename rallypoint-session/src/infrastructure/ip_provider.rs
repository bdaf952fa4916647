use crate::infrastructure::error::IpLookupError;
use async_trait::async_trait;

/// Discovers the public IP of this machine
#[async_trait]
pub trait IpProvider: Send + Sync {
    async fn public_ip(&self) -> Result<String, IpLookupError>;
}

/// Provider returning a fixed address
#[derive(Debug, Clone)]
pub struct StaticIpProvider {
    ip: String,
}

impl StaticIpProvider {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

#[async_trait]
impl IpProvider for StaticIpProvider {
    async fn public_ip(&self) -> Result<String, IpLookupError> {
        if self.ip.is_empty() {
            return Err(IpLookupError::Unavailable("no address configured".to_string()));
        }
        Ok(self.ip.clone())
    }
}

use serde::{Deserialize, Serialize};

/// Relay session as reported by the relay service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySession {
    pub session_id: String,

    #[serde(default)]
    pub session_users: Vec<SessionUser>,

    /// The relay finished allocating the session
    #[serde(default)]
    pub ready: bool,
}

/// One endpoint registered on a relay session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub ip_address: String,
    pub authorization_token: Option<u32>,
}

impl SessionUser {
    pub fn new(ip_address: impl Into<String>, authorization_token: Option<u32>) -> Self {
        Self {
            ip_address: ip_address.into(),
            authorization_token,
        }
    }

    /// Authorized iff a non-zero token was issued
    pub fn is_authorized(&self) -> bool {
        matches!(self.authorization_token, Some(token) if token != 0)
    }
}

impl RelaySession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn user(&self, ip_address: &str) -> Option<&SessionUser> {
        self.session_users
            .iter()
            .find(|u| u.ip_address == ip_address)
    }

    /// Whether `ip_address` holds a valid authorization token
    pub fn is_authorized(&self, ip_address: &str) -> bool {
        self.session_users
            .iter()
            .any(|u| u.ip_address == ip_address && u.is_authorized())
    }

    /// Token issued to `ip_address`, if it is authorized
    pub fn authorization_token(&self, ip_address: &str) -> Option<u32> {
        self.session_users
            .iter()
            .find(|u| u.ip_address == ip_address && u.is_authorized())
            .and_then(|u| u.authorization_token)
    }

    /// Record (or refresh) an authorized endpoint
    pub fn upsert_user(&mut self, user: SessionUser) {
        match self
            .session_users
            .iter_mut()
            .find(|u| u.ip_address == user.ip_address)
        {
            Some(existing) => *existing = user,
            None => self.session_users.push(user),
        }
    }

    pub fn remove_user(&mut self, ip_address: &str) {
        self.session_users.retain(|u| u.ip_address != ip_address);
    }
}

use crate::infrastructure::error::RelayError;
use crate::infrastructure::relay::{RelayClient, RelayResult};
use async_trait::async_trait;
use rallypoint_core::{RelaySession, SessionUser};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct RelayStore {
    sessions: HashMap<String, RelaySession>,
    /// Polls left before a session reports ready
    pending_ready: HashMap<String, usize>,
    ready_after_polls: usize,
    next_token: u32,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, usize>,
}

impl RelayStore {
    fn enter(&mut self, op: &'static str) -> RelayResult<()> {
        *self.calls.entry(op).or_default() += 1;

        match self.failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(RelayError::RequestFailed(format!("{op} failed (injected)")))
            }
            _ => Ok(()),
        }
    }

    fn issue_token(&mut self) -> u32 {
        self.next_token += 1;
        self.next_token
    }

    fn session_mut(&mut self, session_id: &str) -> RelayResult<&mut RelaySession> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))
    }
}

/// In-process relay control plane
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    store: Arc<RwLock<RelayStore>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sessions report ready only after `polls` reads
    pub async fn set_ready_after_polls(&self, polls: usize) {
        self.store.write().await.ready_after_polls = polls;
    }

    pub async fn fail_next(&self, op: &'static str, times: usize) {
        self.store.write().await.failures.insert(op, times);
    }

    pub async fn call_count(&self, op: &str) -> usize {
        self.store.read().await.calls.get(op).copied().unwrap_or(0)
    }

    pub async fn session(&self, session_id: &str) -> Option<RelaySession> {
        self.store.read().await.sessions.get(session_id).cloned()
    }
}

#[async_trait]
impl RelayClient for MemoryRelay {
    async fn create_session(&self, ips: &[String]) -> RelayResult<RelaySession> {
        let mut store = self.store.write().await;
        store.enter("create_session")?;

        let mut session = RelaySession::new(Uuid::new_v4().simple().to_string());
        for ip in ips {
            let token = store.issue_token();
            session.upsert_user(SessionUser::new(ip.clone(), Some(token)));
        }

        let polls = store.ready_after_polls;
        session.ready = polls == 0;
        if polls > 0 {
            store.pending_ready.insert(session.session_id.clone(), polls);
        }

        info!(session = %session.session_id, users = ips.len(), "🛰️ Relay session allocated");
        store.sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> RelayResult<RelaySession> {
        let mut store = self.store.write().await;
        store.enter("get_session")?;

        let now_ready = match store.pending_ready.get_mut(session_id) {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if now_ready {
            store.pending_ready.remove(session_id);
        }

        let session = store.session_mut(session_id)?;
        if now_ready {
            session.ready = true;
        }
        Ok(session.clone())
    }

    async fn authorize_user(&self, session_id: &str, ip_address: &str) -> RelayResult<SessionUser> {
        let mut store = self.store.write().await;
        store.enter("authorize_user")?;

        let token = store.issue_token();
        let user = SessionUser::new(ip_address, Some(token));
        store.session_mut(session_id)?.upsert_user(user.clone());

        debug!(session = session_id, ip = ip_address, "🔑 Relay user authorized");
        Ok(user)
    }

    async fn remove_user(&self, session_id: &str, authorization_token: u32) -> RelayResult<()> {
        let mut store = self.store.write().await;
        store.enter("remove_user")?;

        let session = store.session_mut(session_id)?;
        let ip = session
            .session_users
            .iter()
            .find(|u| u.authorization_token == Some(authorization_token))
            .map(|u| u.ip_address.clone())
            .ok_or_else(|| RelayError::RequestFailed(format!("unknown token {authorization_token}")))?;
        session.remove_user(&ip);

        debug!(session = session_id, ip = %ip, "🔒 Relay user removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_becomes_ready_after_polls() {
        let relay = MemoryRelay::new();
        relay.set_ready_after_polls(2).await;

        let session = relay.create_session(&["1.1.1.1".to_string()]).await.unwrap();
        assert!(!session.ready);
        assert!(session.is_authorized("1.1.1.1"));

        assert!(!relay.get_session(&session.session_id).await.unwrap().ready);
        assert!(relay.get_session(&session.session_id).await.unwrap().ready);
    }

    #[tokio::test]
    async fn test_remove_user_by_token() {
        let relay = MemoryRelay::new();
        let session = relay.create_session(&[]).await.unwrap();

        let user = relay
            .authorize_user(&session.session_id, "2.2.2.2")
            .await
            .unwrap();
        let token = user.authorization_token.unwrap();
        relay.remove_user(&session.session_id, token).await.unwrap();

        let session = relay.session(&session.session_id).await.unwrap();
        assert!(!session.is_authorized("2.2.2.2"));
        assert!(relay.remove_user(&session.session_id, token).await.is_err());
    }
}

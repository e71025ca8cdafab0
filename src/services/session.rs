use crate::services::storage::{StorageService, SESSION_LOGIN_TYPE_KEY, SESSION_TOKEN_KEY};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const SESSION_TTL_SECS: u64 = 86_400 * 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub token: Option<String>,
    pub login_type: Option<String>,
}

/// Explicit session lifecycle over storage, replacing ambient globals:
/// `load()` on boot, `save()` after login, `clear()` on logout. The
/// finalizer reads the bearer token from here for backend calls.
pub struct SessionStore {
    storage: Arc<StorageService>,
    current: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self {
            storage,
            current: RwLock::new(SessionState::default()),
        }
    }

    pub async fn load(&self) -> Result<SessionState> {
        let token: Option<String> = self.storage.get(SESSION_TOKEN_KEY).await?;
        let login_type: Option<String> = self.storage.get(SESSION_LOGIN_TYPE_KEY).await?;

        let state = SessionState { token, login_type };
        *self.current.write().await = state.clone();

        tracing::debug!(
            "Session loaded (authenticated: {})",
            state.token.is_some()
        );
        Ok(state)
    }

    pub async fn save(&self, state: SessionState) -> Result<()> {
        if let Some(token) = &state.token {
            self.storage
                .set(SESSION_TOKEN_KEY, token, SESSION_TTL_SECS)
                .await?;
        }
        if let Some(login_type) = &state.login_type {
            self.storage
                .set(SESSION_LOGIN_TYPE_KEY, login_type, SESSION_TTL_SECS)
                .await?;
        }
        *self.current.write().await = state;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.delete(SESSION_TOKEN_KEY).await?;
        self.storage.delete(SESSION_LOGIN_TYPE_KEY).await?;
        *self.current.write().await = SessionState::default();
        Ok(())
    }

    pub async fn bearer_token(&self) -> Option<String> {
        self.current.read().await.token.clone()
    }
}

//! Shared authentication session
//!
//! One [`AuthSession`] is created per run and shared by every fetch worker.
//! Workers read the current bearer token under a read lock. When a request is
//! rejected with 401, the worker calls [`AuthSession::refresh_after`] with the
//! generation of the token it used; refreshes are serialized and a worker
//! whose token was already replaced simply picks up the new one, so any number
//! of concurrent 401s cause a single refresh grant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{AuthError, TokenPair, TokenProvider};
use crate::config::Credentials;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Token usable
    Active,
    /// A refresh failed; terminal for this run
    Failed,
}

/// Access token plus the generation it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    /// Token value
    pub value: String,
    /// Incremented on every successful refresh
    pub generation: u64,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
    generation: u64,
    failure: Option<String>,
}

impl TokenState {
    fn new(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            issued_at: Utc::now(),
            generation: 0,
            failure: None,
        }
    }

    fn bearer(&self) -> BearerToken {
        BearerToken {
            value: self.access_token.clone(),
            generation: self.generation,
        }
    }
}

/// Token state shared by all workers of a run.
pub struct AuthSession {
    provider: Arc<dyn TokenProvider>,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
    refresh_count: AtomicU64,
}

impl AuthSession {
    /// Authenticate with a password grant.
    ///
    /// Fails with [`AuthError::AuthenticationFailed`] when the identity service
    /// rejects the credentials; callers treat that as fatal for the run.
    pub async fn establish(
        provider: Arc<dyn TokenProvider>,
        credentials: &Credentials,
    ) -> Result<Self, AuthError> {
        let pair = provider
            .password_grant(credentials)
            .await
            .map_err(|e| match e {
                AuthError::AuthenticationFailed(_) => e,
                other => AuthError::AuthenticationFailed(other.to_string()),
            })?;
        info!(username = %credentials.username, "Authenticated");
        Ok(Self::from_tokens(provider, pair))
    }

    /// Session seeded with an already obtained token pair.
    pub fn from_tokens(provider: Arc<dyn TokenProvider>, pair: TokenPair) -> Self {
        Self {
            provider,
            state: RwLock::new(TokenState::new(pair)),
            refresh_lock: Mutex::new(()),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Current bearer token, or [`AuthError::SessionFailed`] once a refresh
    /// has failed.
    pub async fn bearer(&self) -> Result<BearerToken, AuthError> {
        let state = self.state.read().await;
        match &state.failure {
            Some(reason) => Err(AuthError::SessionFailed(reason.clone())),
            None => Ok(state.bearer()),
        }
    }

    /// Replace the token that produced a 401.
    ///
    /// `generation` is the generation of the rejected token. If another worker
    /// refreshed in the meantime, its token is returned without a new grant.
    pub async fn refresh_after(&self, generation: u64) -> Result<BearerToken, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = {
            let state = self.state.read().await;
            if let Some(reason) = &state.failure {
                return Err(AuthError::SessionFailed(reason.clone()));
            }
            if state.generation != generation {
                return Ok(state.bearer());
            }
            state.refresh_token.clone()
        };

        let result = match refresh_token {
            Some(token) => self.provider.refresh_grant(&token).await,
            None => Err(AuthError::RefreshFailed(
                "no refresh token available".to_string(),
            )),
        };

        let mut state = self.state.write().await;
        match result {
            Ok(pair) => {
                state.access_token = pair.access_token;
                if pair.refresh_token.is_some() {
                    state.refresh_token = pair.refresh_token;
                }
                state.issued_at = Utc::now();
                state.generation += 1;
                self.refresh_count.fetch_add(1, Ordering::SeqCst);
                info!(generation = state.generation, "Access token refreshed");
                crate::metrics::record_token_refresh(true);
                Ok(state.bearer())
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "Token refresh failed, session is no longer usable");
                crate::metrics::record_token_refresh(false);
                state.failure = Some(reason.clone());
                Err(AuthError::RefreshFailed(reason))
            }
        }
    }

    /// Number of successful refreshes so far
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        if self.state.read().await.failure.is_some() {
            SessionState::Failed
        } else {
            SessionState::Active
        }
    }

    /// When the current access token was obtained
    pub async fn issued_at(&self) -> DateTime<Utc> {
        self.state.read().await.issued_at
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("refresh_count", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

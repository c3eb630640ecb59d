//! Single-flight credential refresh.
//!
//! ARCHITECTURE
//! ============
//! When several in-flight requests come back 401 at once, exactly one
//! refresh exchange runs. Every caller, including the one that started the
//! exchange, enqueues a one-shot channel and awaits it. The first caller to
//! find the coordinator idle spawns the exchange as its own task, so no single
//! caller being dropped can strand the queue.
//!
//! ```text
//!   IDLE ──first 401──▶ REFRESHING ──settled──▶ IDLE
//!                          │
//!                          └─ later 401s join the waiter queue (FIFO)
//! ```
//!
//! On success the new tokens are persisted before any waiter wakes. On
//! failure (including a missing refresh token) both credentials are cleared
//! and every waiter receives the same `AuthError`.
//!
//! INVARIANTS
//! ==========
//! - At most one exchange runs per coordinator at a time.
//! - Waiters are resumed in the order they were enqueued.
//! - The state mutex is never held across an await.
//! - Lock order is coordinator state, then credential store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::credentials::{CredentialSlot, CredentialStore};
use crate::error::AuthError;
use crate::transport::{ApiRequest, Transport};

// =============================================================================
// TOKENS
// =============================================================================

/// Tokens returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a new token set.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;
}

/// Refresher that posts `{"refreshToken": ...}` to the refresh route.
///
/// The exchange is sent without a bearer header and bypasses the
/// authenticated client, so a 401 here is a plain failure.
pub struct HttpRefresher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl HttpRefresher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, path: &str) -> Self {
        Self { transport, path: path.to_owned() }
    }
}

#[async_trait::async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let request = ApiRequest::post(&self.path, serde_json::json!({ "refreshToken": refresh_token }));
        let response = self
            .transport
            .send(&request, None)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::RefreshRejected { status: response.status });
        }

        response
            .json::<TokenSet>()
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

type Waiter = oneshot::Sender<Result<String, AuthError>>;

#[derive(Clone, Copy)]
enum Trigger<'a> {
    Explicit,
    /// A 401 answered a request that carried this bearer.
    Rejected(Option<&'a str>),
}

enum Joined {
    Current(String),
    Queued(oneshot::Receiver<Result<String, AuthError>>),
}

impl Joined {
    async fn resolve(self) -> Result<String, AuthError> {
        match self {
            Self::Current(token) => Ok(token),
            Self::Queued(rx) => rx.await.unwrap_or(Err(AuthError::RefreshAborted)),
        }
    }
}

#[derive(Default)]
struct CoordinatorInner {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
    exchanges: u64,
}

/// Serializes credential refreshes for one client.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Mutex<CoordinatorInner>>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(refresher: Arc<dyn TokenRefresher>, store: Arc<dyn CredentialStore>) -> Self {
        Self { inner: Arc::new(Mutex::new(CoordinatorInner::default())), refresher, store }
    }

    #[must_use]
    pub fn state(&self) -> RefreshState {
        if self.lock().refreshing { RefreshState::Refreshing } else { RefreshState::Idle }
    }

    /// Number of refresh exchanges started over the coordinator's lifetime.
    #[must_use]
    pub fn exchanges(&self) -> u64 {
        self.lock().exchanges
    }

    /// Number of callers currently waiting on an exchange.
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Wait for a fresh access token, starting an exchange if none is running.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the shared [`AuthError`] if the exchange fails or no refresh
    /// token is stored. Stored credentials have been cleared by then.
    pub async fn refreshed_token(&self) -> Result<String, AuthError> {
        self.join(Trigger::Explicit).resolve().await
    }

    /// Token to use in place of `rejected`, which the server just answered 401.
    ///
    /// If the stored access token already differs from `rejected` and no
    /// exchange is running, it is returned without a new exchange. The check
    /// happens under the coordinator lock, so an exchange that settles just
    /// before this call is never repeated.
    ///
    /// # Errors
    ///
    /// See [`RefreshCoordinator::refreshed_token`].
    pub async fn replacement_for(&self, rejected: Option<&str>) -> Result<String, AuthError> {
        self.join(Trigger::Rejected(rejected)).resolve().await
    }

    /// Enqueue behind the running exchange or start one.
    ///
    /// After a rejection, a stored token other than the rejected one short
    /// circuits while idle.
    fn join(&self, trigger: Trigger<'_>) -> Joined {
        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut inner = self.lock();
            if !inner.refreshing {
                if let Trigger::Rejected(rejected) = trigger {
                    if let Some(current) = self.store.get(CredentialSlot::Access) {
                        if rejected != Some(current.as_str()) {
                            tracing::debug!("credential already refreshed; replaying");
                            return Joined::Current(current);
                        }
                    }
                }
            }
            inner.waiters.push_back(tx);
            if inner.refreshing {
                false
            } else {
                inner.refreshing = true;
                inner.exchanges += 1;
                true
            }
        };

        if lead {
            tracing::debug!("starting credential refresh");
            let settle = Settle { inner: Arc::clone(&self.inner), outcome: None };
            tokio::spawn(run_exchange(Arc::clone(&self.refresher), Arc::clone(&self.store), settle));
        } else {
            tracing::debug!("refresh in flight; queued behind it");
        }
        Joined::Queued(rx)
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_exchange(refresher: Arc<dyn TokenRefresher>, store: Arc<dyn CredentialStore>, mut settle: Settle) {
    let outcome = match store.get(CredentialSlot::Refresh) {
        Some(refresh_token) => refresher.refresh(&refresh_token).await,
        None => Err(AuthError::MissingRefreshToken),
    };

    match &outcome {
        Ok(tokens) => {
            store.store_tokens(tokens);
            tracing::info!(rotated = tokens.refresh_token.is_some(), "credential refresh succeeded");
        }
        Err(e) => {
            store.clear();
            tracing::warn!(error = %e, "credential refresh failed; credentials cleared");
        }
    }

    settle.outcome = Some(outcome.map(|tokens| tokens.access_token));
}

/// Returns the coordinator to idle and wakes every waiter when dropped.
///
/// Dropping without an outcome (task panicked or was cancelled at runtime
/// shutdown) rejects the waiters with [`AuthError::RefreshAborted`].
struct Settle {
    inner: Arc<Mutex<CoordinatorInner>>,
    outcome: Option<Result<String, AuthError>>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.refreshing = false;
            std::mem::take(&mut inner.waiters)
        };
        let outcome = self.outcome.take().unwrap_or(Err(AuthError::RefreshAborted));

        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in waiters {
            if waiter.send(outcome.clone()).is_err() {
                tracing::debug!("refresh waiter dropped before settling");
            }
        }
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;

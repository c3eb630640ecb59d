//! Authenticated API client.
//!
//! DESIGN
//! ======
//! Every request goes out with the stored access token. A 401 on the first
//! attempt is recovered once: if another request already refreshed the token
//! we replay with the stored one, otherwise we wait on the shared
//! [`RefreshCoordinator`]. A 401 on the second attempt, and every other
//! failure, is returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ApiConfig, ApiRoutes, DEFAULT_QUERY_STALE_SECS, normalize_path};
use crate::credentials::{CredentialSlot, CredentialStore};
use crate::error::ApiError;
use crate::pagination::Page;
use crate::query::QueryCache;
use crate::refresh::{HttpRefresher, RefreshCoordinator, TokenRefresher, TokenSet};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Attempts per request: the original send plus one replay.
const MAX_ATTEMPTS: u8 = 2;

/// One send of a request together with the credential it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attempt {
    number: u8,
    bearer: Option<String>,
}

impl Attempt {
    fn first(bearer: Option<String>) -> Self {
        Self { number: 1, bearer }
    }

    fn replay(&self, bearer: String) -> Self {
        Self { number: self.number + 1, bearer: Some(bearer) }
    }

    fn can_replay(&self) -> bool {
        self.number < MAX_ATTEMPTS
    }
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    routes: ApiRoutes,
    queries: Arc<QueryCache>,
}

impl ApiClient {
    /// Build a reqwest-backed client whose refresher posts to the configured route.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &ApiConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.base_url, config.timeouts)?);
        let refresher = Arc::new(HttpRefresher::new(Arc::clone(&transport), &config.routes.refresh));
        Ok(Self::from_parts(transport, refresher, store, config.routes.clone())
            .with_query_stale_time(config.query_stale_time()))
    }

    #[must_use]
    pub fn from_parts(
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn CredentialStore>,
        routes: ApiRoutes,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(refresher, Arc::clone(&store));
        let queries = Arc::new(QueryCache::new(Duration::from_secs(DEFAULT_QUERY_STALE_SECS)));
        Self { transport, store, coordinator, routes, queries }
    }

    /// Replace the query cache with an empty one using `stale_time`.
    #[must_use]
    pub fn with_query_stale_time(mut self, stale_time: Duration) -> Self {
        self.queries = Arc::new(QueryCache::new(stale_time));
        self
    }

    #[must_use]
    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.get(CredentialSlot::Access).is_some()
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Send a request with the stored credential, recovering one 401.
    ///
    /// Returns the response whatever its status, except a 401 that survives
    /// its replay, which becomes [`ApiError::Status`].
    ///
    /// # Errors
    ///
    /// Transport failures, refresh failures, and a repeated 401.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let span = tracing::debug_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = Attempt::first(self.store.get(CredentialSlot::Access));
        loop {
            tracing::debug!(attempt = attempt.number, authenticated = attempt.bearer.is_some(), "sending");
            let response = self
                .transport
                .send(request, attempt.bearer.as_deref())
                .await?;

            if !response.is_unauthorized() {
                return Ok(response);
            }
            if !attempt.can_replay() {
                tracing::warn!(attempt = attempt.number, "unauthorized after replay");
                return response.error_for_status();
            }

            let token = self
                .coordinator
                .replacement_for(attempt.bearer.as_deref())
                .await?;
            attempt = attempt.replay(token);
        }
    }

    /// Execute and deserialize a successful JSON response.
    ///
    /// # Errors
    ///
    /// Everything [`ApiClient::execute`] returns, plus non-2xx statuses and
    /// parse failures.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        self.execute(request).await?.error_for_status()?.json()
    }

    /// `GET path` and deserialize the reply.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::get(path)).await
    }

    /// `GET path` through the query cache.
    ///
    /// A reply fetched within the stale time is served without touching the
    /// network. Concurrent misses on one path share a single request.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`]; failures are not cached.
    pub async fn get_json_cached<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let key = normalize_path(path);
        let value = self
            .queries
            .fetch(&key, || self.get_json::<serde_json::Value>(&key))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::post(path, to_value(body)?)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::put(path, to_value(body)?)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn patch_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::patch(path, to_value(body)?)).await
    }

    /// `DELETE path`, ignoring any reply body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]; non-2xx statuses are errors.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(&ApiRequest::delete(path))
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch one offset page: `GET path?limit=..&skip=..`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn fetch_page<T: DeserializeOwned>(&self, path: &str, skip: u64, limit: u64) -> Result<Page<T>, ApiError> {
        let request = ApiRequest::get(path).query("limit", limit).query("skip", skip);
        self.send_json(&request).await
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Exchange login credentials for tokens and store them.
    ///
    /// The login call is sent without a bearer and is never replayed.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses, or a reply that is not a token set.
    pub async fn login<B: Serialize>(&self, credentials: &B) -> Result<TokenSet, ApiError> {
        let request = ApiRequest::post(&self.routes.login, to_value(credentials)?);
        let tokens: TokenSet = self
            .transport
            .send(&request, None)
            .await?
            .error_for_status()?
            .json()?;
        self.store.store_tokens(&tokens);
        tracing::info!(has_refresh = tokens.refresh_token.is_some(), "logged in");
        Ok(tokens)
    }

    /// Tell the server to end the session, then clear local credentials.
    ///
    /// Credentials and cached queries are cleared even when the server call
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the server call's error after clearing.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let bearer = self.store.get(CredentialSlot::Access);
        let request = ApiRequest::new(reqwest::Method::POST, &self.routes.logout);
        let outcome = self
            .transport
            .send(&request, bearer.as_deref())
            .await
            .and_then(|response| response.error_for_status().map(|_| ()));
        self.store.clear();
        self.queries.clear();
        match &outcome {
            Ok(()) => tracing::info!("logged out"),
            Err(e) => tracing::warn!(error = %e, "logout call failed; local credentials cleared"),
        }
        outcome
    }
}

fn to_value<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

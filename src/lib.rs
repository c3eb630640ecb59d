//! Authenticated HTTP API client.
//!
//! DESIGN
//! ======
//! [`ApiClient`] attaches the stored access token to every call. When calls
//! come back 401 it asks its [`RefreshCoordinator`] for a new token, which
//! runs one refresh exchange for however many callers are waiting and replays
//! each of them once. Credentials live behind [`CredentialStore`]: in memory,
//! or in cookies read from a request or a persisted `Cookie:` header.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pagination;
pub mod query;
pub mod refresh;
pub mod transport;

pub use client::ApiClient;
pub use config::{ApiConfig, ApiRoutes, ApiTimeouts};
pub use credentials::{CookieStore, CredentialSlot, CredentialStore, MemoryStore};
pub use error::{ApiError, AuthError, ErrorCode};
pub use pagination::{Page, PageSet};
pub use query::QueryCache;
pub use refresh::{HttpRefresher, RefreshCoordinator, RefreshState, TokenRefresher, TokenSet};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

pub use reqwest::Method;

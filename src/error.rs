//! Error types for the API client.
//!
//! DESIGN
//! ======
//! `AuthError` is `Clone` because a single refresh outcome is broadcast to
//! every waiter queued behind it. `ApiError` wraps it alongside the transport
//! and response failures that pass through the client untouched.

// =============================================================================
// ERROR CODES
// =============================================================================

/// Stable machine-readable classification for errors surfaced to callers.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Failures of the credential refresh path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// A refresh was needed but no refresh token is stored.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected: status {status}")]
    RefreshRejected { status: u16 },

    /// The refresh exchange could not be completed (network or bad payload).
    #[error("refresh exchange failed: {0}")]
    RefreshFailed(String),

    /// The refresh task ended without producing an outcome.
    #[error("refresh aborted before settling")]
    RefreshAborted,
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "E_MISSING_REFRESH_TOKEN",
            Self::RefreshRejected { .. } => "E_REFRESH_REJECTED",
            Self::RefreshFailed(_) => "E_REFRESH_FAILED",
            Self::RefreshAborted => "E_REFRESH_ABORTED",
        }
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Errors produced by API client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// A header name or value supplied by the caller is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Credential refresh failed; stored credentials have been cleared.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// True when the caller should treat the session as logged out.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Status { status: 401, .. })
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Request(_) => "E_REQUEST",
            Self::Status { status: 401, .. } => "E_UNAUTHORIZED",
            Self::Status { .. } => "E_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::InvalidHeader(_) => "E_INVALID_HEADER",
            Self::Auth(inner) => inner.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

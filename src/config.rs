//! API client configuration parsed from environment variables.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
pub const DEFAULT_LOGOUT_PATH: &str = "/auth/logout";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_STALE_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoutes {
    pub refresh: String,
    pub login: String,
    pub logout: String,
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH_PATH.to_owned(),
            login: DEFAULT_LOGIN_PATH.to_owned(),
            logout: DEFAULT_LOGOUT_PATH.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub routes: ApiRoutes,
    pub timeouts: ApiTimeouts,
    pub query_stale_secs: u64,
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Config for `base_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ConfigParse`] if the URL is not `http://` or `https://`.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = parse_base_url(base_url)?;
        let cookie_secure = base_url.starts_with("https://");
        Ok(Self {
            base_url,
            routes: ApiRoutes::default(),
            timeouts: ApiTimeouts::default(),
            query_stale_secs: DEFAULT_QUERY_STALE_SECS,
            cookie_secure,
        })
    }

    /// Build typed API config from environment variables.
    ///
    /// Optional:
    /// - `API_BASE_URL`: default `http://localhost:5000/api`
    /// - `API_REFRESH_PATH` / `API_LOGIN_PATH` / `API_LOGOUT_PATH`
    /// - `API_REQUEST_TIMEOUT_SECS`: default 30
    /// - `API_CONNECT_TIMEOUT_SECS`: default 10
    /// - `API_QUERY_STALE_SECS`: default 60
    /// - `COOKIE_SECURE`: defaults to true only for https base URLs
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ConfigParse`] if `API_BASE_URL` has an unsupported scheme.
    pub fn from_env() -> Result<Self, ApiError> {
        let raw_base = std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_owned());
        let mut config = Self::new(&raw_base)?;

        config.routes = ApiRoutes {
            refresh: env_path("API_REFRESH_PATH", DEFAULT_REFRESH_PATH),
            login: env_path("API_LOGIN_PATH", DEFAULT_LOGIN_PATH),
            logout: env_path("API_LOGOUT_PATH", DEFAULT_LOGOUT_PATH),
        };
        config.timeouts = ApiTimeouts {
            request_secs: env_parse_u64("API_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        config.query_stale_secs = env_parse_u64("API_QUERY_STALE_SECS", DEFAULT_QUERY_STALE_SECS);
        if let Some(secure) = env_bool("COOKIE_SECURE") {
            config.cookie_secure = secure;
        }

        Ok(config)
    }

    #[must_use]
    pub fn query_stale_time(&self) -> Duration {
        Duration::from_secs(self.query_stale_secs)
    }
}

fn parse_base_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ApiError::ConfigParse(format!("unsupported API_BASE_URL '{raw}' (expected http:// or https://)")));
    }
    Ok(trimmed.to_owned())
}

/// Ensure a route path starts with a single `/`.
pub(crate) fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

fn env_path(key: &str, default: &str) -> String {
    std::env::var(key).map_or_else(|_| default.to_owned(), |v| normalize_path(&v))
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).map_or(default, |v| v.trim().parse::<u64>().unwrap_or(default))
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

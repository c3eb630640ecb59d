//! Request/response values and the HTTP transport seam.
//!
//! DESIGN
//! ======
//! `ApiRequest` is immutable across attempts. The bearer credential is passed
//! to [`Transport::send`] separately, so a replay never mutates the caller's
//! request. `HttpTransport` is the reqwest-backed implementation; tests
//! substitute their own `Transport`.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::config::{ApiTimeouts, normalize_path};
use crate::error::ApiError;

// =============================================================================
// REQUEST
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, always starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self { method, path: normalize_path(path), query: Vec::new(), headers: HeaderMap::new(), body: None }
    }

    #[must_use]
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: &str, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    #[must_use]
    pub fn put(path: &str, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).json(body)
    }

    #[must_use]
    pub fn patch(path: &str, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path).json(body)
    }

    #[must_use]
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    /// Add a header.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidHeader`] for a malformed name or value.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Convert a non-success response into [`ApiError::Status`].
    ///
    /// # Errors
    ///
    /// Returns the status error for any non-2xx response.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status { status: self.status, body: self.body })
        }
    }

    /// Deserialize the body. An empty body is parsed as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Parse`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = if self.body.trim().is_empty() { "null" } else { self.body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Sends one request attempt.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, attaching `Authorization: Bearer <bearer>` when given.
    ///
    /// Any HTTP status is a successful send; only failures to reach the
    /// server or read the reply are errors.
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, ApiError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the reqwest client fails to build.
    pub fn new(base_url: &str, timeouts: ApiTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, normalize_path(path))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(outgoing_headers(request, bearer));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        Ok(ApiResponse { status, headers, body })
    }
}

/// The request's own headers, minus any `Authorization` the bearer replaces.
fn outgoing_headers(request: &ApiRequest, bearer: Option<&str>) -> HeaderMap {
    let mut headers = request.headers.clone();
    if bearer.is_some() {
        headers.remove(AUTHORIZATION);
    }
    headers
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

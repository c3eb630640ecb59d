//! Cookie-backed credential store.
//!
//! SYSTEM CONTEXT
//! ==============
//! The same two cookies are readable from an incoming request (server side)
//! and from a persisted `Cookie:` header string (CLI side). Changes are
//! rendered back either as a `Cookie:` header for the next outbound call or
//! as `Set-Cookie` values for a response.

use std::collections::HashSet;
use std::sync::Mutex;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use time::Duration;

use super::{CredentialSlot, CredentialStore};
use crate::error::ApiError;

pub struct CookieStore {
    inner: Mutex<CookieState>,
    secure: bool,
}

struct CookieState {
    jar: CookieJar,
    /// Slots removed since construction; rendered as expiring cookies.
    removed: HashSet<CredentialSlot>,
}

impl CookieStore {
    #[must_use]
    pub fn new(secure: bool) -> Self {
        Self::from_jar(CookieJar::new(), secure)
    }

    /// Read credentials from the `Cookie` headers of an incoming request.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        Self::from_jar(CookieJar::from_headers(headers), secure)
    }

    /// Read credentials from a raw `Cookie:` header value (`a=1; b=2`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidHeader`] if the string is not a valid header value.
    pub fn from_cookie_header(raw: &str, secure: bool) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let value = HeaderValue::from_str(trimmed).map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
            headers.insert(COOKIE, value);
        }
        Ok(Self::from_headers(&headers, secure))
    }

    fn from_jar(jar: CookieJar, secure: bool) -> Self {
        Self { inner: Mutex::new(CookieState { jar, removed: HashSet::new() }), secure }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CookieState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Render the stored credentials as a `Cookie:` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        let state = self.state();
        CredentialSlot::ALL
            .iter()
            .filter_map(|slot| state.jar.get(slot.cookie_name()))
            .map(|c| c.stripped().encoded().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Render `Set-Cookie` values for every populated or removed slot.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        let state = self.state();
        let mut out = Vec::new();
        for slot in CredentialSlot::ALL {
            let name = slot.cookie_name();
            if let Some(current) = state.jar.get(name) {
                out.push(self.build_cookie(name, current.value().to_owned()).encoded().to_string());
            } else if state.removed.contains(&slot) {
                let mut expired = self.build_cookie(name, String::new());
                expired.set_max_age(Duration::ZERO);
                out.push(expired.encoded().to_string());
            }
        }
        out
    }

    fn build_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build()
    }
}

impl CredentialStore for CookieStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.state()
            .jar
            .get(slot.cookie_name())
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn set(&self, slot: CredentialSlot, value: &str) {
        let cookie = self.build_cookie(slot.cookie_name(), value.to_owned());
        let mut state = self.state();
        let jar = std::mem::replace(&mut state.jar, CookieJar::new());
        state.jar = jar.add(cookie);
        state.removed.remove(&slot);
    }

    fn remove(&self, slot: CredentialSlot) {
        let mut state = self.state();
        let jar = std::mem::replace(&mut state.jar, CookieJar::new());
        state.jar = jar.remove(Cookie::build(slot.cookie_name()).path("/"));
        state.removed.insert(slot);
    }
}

#[cfg(test)]
#[path = "cookie_test.rs"]
mod tests;

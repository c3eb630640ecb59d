//! Credential storage.
//!
//! DESIGN
//! ======
//! Two named slots, access and refresh. Stores only get/set/remove; expiry is
//! discovered through 401 responses, never by inspecting the token locally.
//! The trait is synchronous so the refresh coordinator can persist new
//! tokens without holding anything across an await point.

pub mod cookie;

use std::collections::HashMap;
use std::sync::Mutex;

pub use cookie::CookieStore;

use crate::refresh::TokenSet;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// One of the two credential slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
    Access,
    Refresh,
}

impl CredentialSlot {
    pub const ALL: [Self; 2] = [Self::Access, Self::Refresh];

    /// Cookie name the slot is stored under.
    #[must_use]
    pub fn cookie_name(self) -> &'static str {
        match self {
            Self::Access => ACCESS_TOKEN_COOKIE,
            Self::Refresh => REFRESH_TOKEN_COOKIE,
        }
    }
}

/// Storage for the access and refresh credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self, slot: CredentialSlot) -> Option<String>;

    fn set(&self, slot: CredentialSlot, value: &str);

    fn remove(&self, slot: CredentialSlot);

    /// Remove both credentials.
    fn clear(&self) {
        for slot in CredentialSlot::ALL {
            self.remove(slot);
        }
    }

    /// Persist a token set. The refresh slot is left untouched when the set
    /// carries no refresh token.
    fn store_tokens(&self, tokens: &TokenSet) {
        self.set(CredentialSlot::Access, &tokens.access_token);
        if let Some(refresh) = &tokens.refresh_token {
            self.set(CredentialSlot::Refresh, refresh);
        }
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<CredentialSlot, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given credentials.
    #[must_use]
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let store = Self::new();
        if let Some(access) = access {
            store.set(CredentialSlot::Access, access);
        }
        if let Some(refresh) = refresh {
            store.set(CredentialSlot::Refresh, refresh);
        }
        store
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialSlot, String>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.slots().get(&slot).cloned()
    }

    fn set(&self, slot: CredentialSlot, value: &str) {
        self.slots().insert(slot, value.to_owned());
    }

    fn remove(&self, slot: CredentialSlot) {
        self.slots().remove(&slot);
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

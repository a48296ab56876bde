//! Grouped persistence for the session's four stored records.
//!
//! The access token, refresh token, user profile and expiry timestamp are
//! always written and cleared together so partial state cannot survive a
//! transition. Each value is encrypted under the `auth_token` purpose; a
//! value that fails to decrypt is treated as a legacy plaintext record and
//! rewritten encrypted, closing the migration window after one read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::crypto::{CryptoError, CryptoService};
use crate::models::{Session, UserProfile};
use crate::store::SecretStore;

/// Purpose id for session-record encryption.
const AUTH_TOKEN_PURPOSE: &str = "auth_token";

pub(crate) const KEY_ACCESS_TOKEN: &str = "session_access_token";
pub(crate) const KEY_REFRESH_TOKEN: &str = "session_refresh_token";
pub(crate) const KEY_USER_PROFILE: &str = "session_user_profile";
pub(crate) const KEY_EXPIRES_AT: &str = "session_expires_at";

pub struct SessionRecords {
    store: Arc<dyn SecretStore>,
    crypto: Arc<CryptoService>,
}

impl SessionRecords {
    pub fn new(store: Arc<dyn SecretStore>, crypto: Arc<CryptoService>) -> Self {
        Self { store, crypto }
    }

    /// Persist the session and profile, all four records together.
    pub fn write(&self, session: &Session, profile: Option<&UserProfile>) {
        self.put(KEY_ACCESS_TOKEN, &session.access_token);

        match &session.refresh_token {
            Some(token) => self.put(KEY_REFRESH_TOKEN, token),
            None => self.store.erase(KEY_REFRESH_TOKEN),
        }

        match session.expires_at {
            Some(at) => self.put(KEY_EXPIRES_AT, &at.to_rfc3339()),
            None => self.store.erase(KEY_EXPIRES_AT),
        }

        match profile {
            Some(profile) => match serde_json::to_string(profile) {
                Ok(json) => self.put(KEY_USER_PROFILE, &json),
                Err(err) => warn!(error = %err, "failed to serialize user profile"),
            },
            None => self.store.erase(KEY_USER_PROFILE),
        }
    }

    /// Remove all four records.
    pub fn clear(&self) {
        self.store.erase(KEY_ACCESS_TOKEN);
        self.store.erase(KEY_REFRESH_TOKEN);
        self.store.erase(KEY_USER_PROFILE);
        self.store.erase(KEY_EXPIRES_AT);
    }

    /// Load the persisted session. `None` when the access-token record is
    /// absent, which is the anonymous state.
    pub fn load(&self) -> Option<Session> {
        let access_token = self.take(KEY_ACCESS_TOKEN)?;
        let refresh_token = self.take(KEY_REFRESH_TOKEN);
        let expires_at = self
            .take(KEY_EXPIRES_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Session {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    pub fn load_profile(&self) -> Option<UserProfile> {
        let json = self.take(KEY_USER_PROFILE)?;
        match serde_json::from_str(&json) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(error = %err, "persisted profile unreadable");
                None
            }
        }
    }

    fn put(&self, key: &str, value: &str) {
        match self.crypto.encrypt(value, AUTH_TOKEN_PURPOSE) {
            Ok(sealed) => self.store.write(key, &sealed),
            Err(err) => warn!(key, error = %err, "failed to encrypt session record"),
        }
    }

    /// Read and decrypt one record. A value that fails to decrypt is
    /// treated as legacy plaintext and migrated in place.
    fn take(&self, key: &str) -> Option<String> {
        let stored = self.store.read(key)?;
        match self.crypto.decrypt(&stored, AUTH_TOKEN_PURPOSE) {
            Ok(plain) => Some(plain),
            Err(CryptoError::DecryptionFailed) | Err(CryptoError::InvalidCiphertext) => {
                debug!(key, "record not decryptable, migrating legacy plaintext");
                self.put(key, &stored);
                Some(stored)
            }
            Err(err) => {
                warn!(key, error = %err, "failed to decrypt session record");
                None
            }
        }
    }
}

//! OS keystore backend via the `keyring` crate.

use keyring::Entry;
use tracing::{debug, warn};

use super::SecretStore;

pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    /// Probe the platform keystore. Returns `None` when it cannot be
    /// reached, in which case callers fall back to file storage.
    pub fn probe(service: &str) -> Option<Self> {
        let entry = Entry::new(service, "__probe__").ok()?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Some(Self {
                service: service.to_string(),
            }),
            Err(err) => {
                debug!(error = %err, "keystore probe failed");
                None
            }
        }
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        match Entry::new(&self.service, key) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key, error = %err, "failed to create keyring entry");
                None
            }
        }
    }
}

impl SecretStore for KeychainStore {
    fn read(&self, key: &str) -> Option<String> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                warn!(key, error = %err, "failed to read keyring entry");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Some(entry) = self.entry(key) {
            if let Err(err) = entry.set_password(value) {
                warn!(key, error = %err, "failed to store keyring entry");
            }
        }
    }

    fn erase(&self, key: &str) {
        if let Some(entry) = self.entry(key) {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(err) => warn!(key, error = %err, "failed to delete keyring entry"),
            }
        }
    }
}

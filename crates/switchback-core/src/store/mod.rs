//! Platform-abstracted secret persistence.
//!
//! This module provides:
//! - `SecretStore`: the strategy seam for key/value secret storage
//! - `KeychainStore`: the OS keystore backend, used when it answers a probe
//! - `FallbackStore`: a best-effort unprotected file backend
//!
//! Secure-storage unavailability must never block application usage, so
//! backend selection happens once at construction and failures inside a
//! backend are logged rather than surfaced. Every value stored here is
//! assumed untrusted until decrypted by the crypto service.

pub mod fallback;
pub mod keychain;

pub use fallback::FallbackStore;
pub use keychain::KeychainStore;

use std::sync::Arc;

use tracing::warn;

/// Trait for secret storage backends
pub trait SecretStore: Send + Sync {
    /// Retrieve a stored value, or `None` when absent or unreadable.
    fn read(&self, key: &str) -> Option<String>;

    /// Store a value. Failures are logged, never surfaced.
    fn write(&self, key: &str, value: &str);

    /// Remove a value. Failures are logged, never surfaced.
    fn erase(&self, key: &str);

    /// Check if a key exists
    fn has(&self, key: &str) -> bool {
        self.read(key).is_some()
    }
}

/// Open the best store available for `service`: the platform keystore when
/// it responds, otherwise the file fallback.
pub fn open_default(service: &str) -> Arc<dyn SecretStore> {
    match KeychainStore::probe(service) {
        Some(store) => Arc::new(store),
        None => {
            warn!(service, "platform keystore unavailable, using file fallback");
            Arc::new(FallbackStore::open(service))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.write("k", "v");
        assert_eq!(store.read("k"), Some("v".to_string()));
        assert!(store.has("k"));
        assert!(!store.has("missing"));
        store.erase("k");
        assert_eq!(store.read("k"), None);
    }
}

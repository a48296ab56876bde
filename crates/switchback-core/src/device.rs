//! Stable per-device identifier derived from environment attributes.
//!
//! The identifier seeds key derivation on native builds. It is
//! deterministic for a fixed device/environment, stable across process
//! restarts, and explicitly not a secret.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

pub struct DeviceIdentity;

impl DeviceIdentity {
    /// Compute the identifier by hashing a concatenation of environment
    /// attributes: platform, locale, display hint, timezone, concurrency.
    pub fn compute() -> String {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let attrs = [
            std::env::consts::OS.to_string(),
            std::env::consts::ARCH.to_string(),
            std::env::var("LANG").unwrap_or_else(|_| "C".to_string()),
            std::env::var("DISPLAY").unwrap_or_else(|_| "headless".to_string()),
            std::env::var("TZ").unwrap_or_else(|_| "local".to_string()),
            parallelism.to_string(),
        ];

        let mut hasher = Sha256::new();
        hasher.update(attrs.join("|").as_bytes());
        STANDARD.encode(hasher.finalize())
    }
}

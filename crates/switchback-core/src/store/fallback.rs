//! Unprotected file-backed store used when no platform keystore responds.
//!
//! Values land in a JSON file under the user data directory. A missing or
//! corrupt file starts the store empty rather than failing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use super::SecretStore;

/// Store file name inside the app data directory
const STORE_FILE: &str = "secrets.json";

pub struct FallbackStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FallbackStore {
    /// Open (or create) the fallback store for `service` under the user
    /// data directory.
    pub fn open(service: &str) -> Self {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(service);
        Self::open_at(dir)
    }

    pub fn open_at(dir: PathBuf) -> Self {
        let path = dir.join(STORE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                debug!(error = %err, "fallback store unreadable, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(error = %err, "failed to create fallback store directory");
                return;
            }
        }
        match serde_json::to_string_pretty(entries) {
            Ok(contents) => {
                if let Err(err) = std::fs::write(&self.path, contents) {
                    warn!(error = %err, "failed to write fallback store");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize fallback store"),
        }
    }
}

impl SecretStore for FallbackStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("fallback store poisoned")
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().expect("fallback store poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn erase(&self, key: &str) {
        let mut entries = self.entries.lock().expect("fallback store poisoned");
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

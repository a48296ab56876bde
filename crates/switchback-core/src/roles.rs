//! Cached view of the authenticated user's authorization role.
//!
//! Role checks are synchronous cache reads; a cold cache falls back to the
//! persisted profile record. The cache must be cleared on every logout or
//! revoke so stale privilege checks cannot survive a session change.

use std::sync::{Arc, Mutex};

use crate::models::UserProfile;
use crate::session::SessionRecords;

pub struct RoleResolver {
    records: Arc<SessionRecords>,
    cached: Mutex<Option<UserProfile>>,
}

impl RoleResolver {
    pub fn new(records: Arc<SessionRecords>) -> Self {
        Self {
            records,
            cached: Mutex::new(None),
        }
    }

    /// Current profile: the in-memory cache, falling back to the persisted
    /// record when cold.
    pub fn profile(&self) -> Option<UserProfile> {
        let mut cached = self.cached.lock().expect("role cache poisoned");
        if cached.is_none() {
            *cached = self.records.load_profile();
        }
        cached.clone()
    }

    pub fn role(&self) -> Option<String> {
        self.profile().map(|profile| profile.role)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role()
            .map(|current| current.eq_ignore_ascii_case(role))
            .unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    pub fn update(&self, profile: UserProfile) {
        *self.cached.lock().expect("role cache poisoned") = Some(profile);
    }

    pub fn clear(&self) {
        self.cached.lock().expect("role cache poisoned").take();
    }
}

//! Core domain types shared across the subsystem.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Buffer time before expiry to trigger refresh (5 minutes)
pub(crate) const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Profile of the authenticated user, sourced from the last successful
/// login or whoami call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// Token pair held while authenticated. Absence of a session is the
/// anonymous state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES),
            None => false,
        }
    }
}

//! Remote authentication API.
//!
//! This module provides:
//! - `AuthApi`: the trait boundary session services call through
//! - `HttpAuthApi`: the reqwest-backed implementation
//! - `LoginOutcome`: tagged result of a login attempt

pub mod client;
pub mod error;

pub use client::HttpAuthApi;
pub use error::ApiError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::UserProfile;

/// Tokens issued by a successful login or refresh.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a login attempt. A second-factor challenge is a distinct,
/// recoverable outcome rather than a generic error.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Success {
        grant: TokenGrant,
        profile: UserProfile,
    },
    SecondFactorRequired,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(
        &self,
        identifier: &str,
        secret: &str,
        second_factor: Option<&str>,
    ) -> Result<LoginOutcome, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;

    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;

    async fn whoami(&self, access_token: &str) -> Result<UserProfile, ApiError>;

    async fn revoke_all(&self, access_token: &str) -> Result<(), ApiError>;
}

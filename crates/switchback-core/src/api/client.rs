//! HTTP client for the authentication endpoints.
//!
//! Five endpoints are consumed: login, refresh, logout, whoami and
//! revoke-all. Responses are structured JSON; bearer authentication where
//! the endpoint requires it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::UserProfile;

use super::{ApiError, AuthApi, LoginOutcome, TokenGrant};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Error code the server sends when a login needs a second factor.
const SECOND_FACTOR_CODE: &str = "second_factor_required";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
    #[serde(rename = "secondFactorCode", skip_serializing_if = "Option::is_none")]
    second_factor_code: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
    user: WireProfile,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireProfile {
    id: i64,
    name: String,
    email: String,
    role: String,
}

impl From<WireProfile> for UserProfile {
    fn from(wire: WireProfile) -> Self {
        UserProfile {
            id: wire.id,
            name: wire.name,
            email: wire.email,
            role: wire.role,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// API client for the authentication server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POST with exponential backoff on 429.
    async fn post<B: Serialize>(
        &self,
        url: &str,
        body: Option<&B>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.client.post(url);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    async fn get(&self, url: &str, bearer: &str) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(url).bearer_auth(bearer).send().await?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn grant_from(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
    ) -> TokenGrant {
        TokenGrant {
            access_token,
            refresh_token,
            expires_at: expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        identifier: &str,
        secret: &str,
        second_factor: Option<&str>,
    ) -> Result<LoginOutcome, ApiError> {
        let url = self.url("auth/login");
        let body = LoginRequest {
            identifier,
            secret,
            second_factor_code: second_factor,
        };
        let response = self.post(&url, Some(&body), None).await?;

        let status = response.status();
        if status.is_success() {
            let parsed: LoginResponse = response
                .json()
                .await
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
            return Ok(LoginOutcome::Success {
                grant: Self::grant_from(
                    parsed.access_token,
                    parsed.refresh_token,
                    parsed.expires_in,
                ),
                profile: parsed.user.into(),
            });
        }

        let text = response.text().await.unwrap_or_default();
        // A second-factor challenge comes back as a structured error body,
        // not a credential rejection.
        if let Ok(err_body) = serde_json::from_str::<ErrorBody>(&text) {
            if err_body.error.as_deref() == Some(SECOND_FACTOR_CODE) {
                return Ok(LoginOutcome::SecondFactorRequired);
            }
        }
        Err(ApiError::from_status(status, &text))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let url = self.url("auth/refresh");
        let body = RefreshRequest { refresh_token };
        let response = Self::check(self.post(&url, Some(&body), None).await?).await?;

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(Self::grant_from(
            parsed.access_token,
            parsed.refresh_token,
            parsed.expires_in,
        ))
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.url("auth/logout");
        Self::check(self.post::<()>(&url, None, Some(access_token)).await?).await?;
        Ok(())
    }

    async fn whoami(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let url = self.url("auth/whoami");
        let response = Self::check(self.get(&url, access_token).await?).await?;

        let parsed: WireProfile = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(parsed.into())
    }

    async fn revoke_all(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.url("auth/revoke-all");
        Self::check(self.post::<()>(&url, None, Some(access_token)).await?).await?;
        Ok(())
    }
}

//! Session lifecycle: login, expiry-aware token access, single-flight
//! refresh, logout and revocation.
//!
//! Every state transition writes through the crypto service and secret
//! store via [`SessionRecords`], and refreshes the role cache where the
//! server returned profile data.

pub mod records;

pub use records::SessionRecords;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthApi, LoginOutcome, TokenGrant};
use crate::error::AuthError;
use crate::models::{Session, UserProfile};
use crate::roles::RoleResolver;

/// Future memoized while a refresh is in flight. Waiters share the one
/// outcome; the error side is just the reason, which every waiter can
/// clone.
type SharedRefresh = Shared<BoxFuture<'static, Result<Session, String>>>;

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    records: Arc<SessionRecords>,
    roles: Arc<RoleResolver>,
    session: Mutex<Option<Session>>,
    /// Set after a successful offline credential verification.
    offline_unlocked: AtomicBool,
    refresh_gate: Mutex<Option<SharedRefresh>>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn AuthApi>,
        records: Arc<SessionRecords>,
        roles: Arc<RoleResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                records,
                roles,
                session: Mutex::new(None),
                offline_unlocked: AtomicBool::new(false),
                refresh_gate: Mutex::new(None),
            }),
        }
    }

    /// Hydrate the in-memory session from persisted records on cold start.
    /// Returns true when a session was found.
    pub fn restore(&self) -> bool {
        match self.inner.records.load() {
            Some(session) => {
                *self.inner.session.lock().expect("session state poisoned") = Some(session);
                if let Some(profile) = self.inner.records.load_profile() {
                    self.inner.roles.update(profile);
                }
                true
            }
            None => false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.has_online_session() || self.inner.offline_unlocked.load(Ordering::SeqCst)
    }

    /// True only when token-bearing session state exists; an offline
    /// unlock does not count.
    pub fn has_online_session(&self) -> bool {
        self.inner
            .session
            .lock()
            .expect("session state poisoned")
            .is_some()
    }

    /// Authenticate against the remote endpoint. A second-factor challenge
    /// surfaces as [`AuthError::SecondFactorRequired`] so the caller can
    /// re-prompt and retry with a code.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        second_factor: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        let outcome = match self.inner.api.login(identifier, secret, second_factor).await {
            Ok(outcome) => outcome,
            Err(ApiError::Unauthorized) => return Err(AuthError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        };

        match outcome {
            LoginOutcome::SecondFactorRequired => Err(AuthError::SecondFactorRequired),
            LoginOutcome::Success { grant, profile } => {
                let session = session_from_grant(grant, None);
                self.inner.records.write(&session, Some(&profile));
                *self.inner.session.lock().expect("session state poisoned") = Some(session);
                self.inner.roles.update(profile.clone());
                info!(user = profile.id, "login succeeded");
                Ok(profile)
            }
        }
    }

    /// Current access token, refreshed first when it is close to expiry.
    /// `None` means the caller must re-authenticate.
    pub async fn get_access_token(&self) -> Option<String> {
        let (token, needs_refresh, expired, has_refresh) = {
            let guard = self.inner.session.lock().expect("session state poisoned");
            match guard.as_ref() {
                Some(session) => (
                    session.access_token.clone(),
                    session.needs_refresh(),
                    session.is_expired(),
                    session.refresh_token.is_some(),
                ),
                None => return None,
            }
        };

        if !needs_refresh {
            return Some(token);
        }
        if !has_refresh {
            // Inside the margin the token is still literally valid; once
            // expired there is no way forward but a fresh login.
            return if expired { None } else { Some(token) };
        }

        match self.ensure_refreshed().await {
            Ok(fresh) => Some(fresh),
            Err(err) => {
                debug!(error = %err, "refresh failed while fetching access token");
                None
            }
        }
    }

    /// Deduplicated refresh: concurrent callers observe the one in-flight
    /// operation rather than starting a second network round trip. The
    /// in-flight marker is cleared on both paths before the outcome is
    /// visible to any waiter, so a new refresh can always be started
    /// afterwards. On failure, all stored session data is cleared.
    pub async fn ensure_refreshed(&self) -> Result<String, AuthError> {
        let shared = {
            let mut gate = self.inner.refresh_gate.lock().expect("refresh gate poisoned");
            match gate.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fut = async move {
                        let outcome = Inner::run_refresh(&inner).await;
                        inner
                            .refresh_gate
                            .lock()
                            .expect("refresh gate poisoned")
                            .take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *gate = Some(fut.clone());
                    fut
                }
            }
        };

        match shared.await {
            Ok(session) => Ok(session.access_token),
            Err(reason) => Err(AuthError::RefreshFailed { reason }),
        }
    }

    /// Best-effort server revoke followed by unconditional local clearing.
    pub async fn logout(&self) {
        let token = {
            self.inner
                .session
                .lock()
                .expect("session state poisoned")
                .as_ref()
                .map(|session| session.access_token.clone())
        };
        if let Some(token) = token {
            if let Err(err) = self.inner.api.logout(&token).await {
                warn!(error = %err, "logout revoke failed, clearing locally anyway");
            }
        }
        self.inner.clear_local();
        info!("logged out");
    }

    /// Invalidate every outstanding token for the account. Local state is
    /// cleared only when the server acknowledges; on failure server and
    /// local truth may disagree until the next failed call forces a
    /// logout, so the error is surfaced and nothing is touched.
    pub async fn revoke_all_tokens(&self) -> Result<(), AuthError> {
        let token = self
            .get_access_token()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        self.inner.api.revoke_all(&token).await?;
        self.inner.clear_local();
        info!("all tokens revoked");
        Ok(())
    }

    /// Fetch the current profile from the server and refresh both the
    /// role cache and the persisted profile record.
    pub async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        let token = self
            .get_access_token()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        let profile = self.inner.api.whoami(&token).await?;

        let session = {
            self.inner
                .session
                .lock()
                .expect("session state poisoned")
                .clone()
        };
        if let Some(session) = session {
            self.inner.records.write(&session, Some(&profile));
        }
        self.inner.roles.update(profile.clone());
        Ok(profile)
    }

    /// Mark the local session authenticated after a successful offline
    /// credential verification. No network is involved.
    pub(crate) fn mark_offline_unlocked(&self, profile: &UserProfile) {
        self.inner.offline_unlocked.store(true, Ordering::SeqCst);
        self.inner.roles.update(profile.clone());
    }

    #[cfg(test)]
    pub(crate) fn set_expires_at(&self, at: Option<chrono::DateTime<chrono::Utc>>) {
        if let Some(session) = self
            .inner
            .session
            .lock()
            .expect("session state poisoned")
            .as_mut()
        {
            session.expires_at = at;
        }
    }
}

impl Inner {
    async fn run_refresh(inner: &Arc<Inner>) -> Result<Session, String> {
        let refresh_token = {
            inner
                .session
                .lock()
                .expect("session state poisoned")
                .as_ref()
                .and_then(|session| session.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            inner.clear_local();
            return Err("no refresh token available".to_string());
        };

        match inner.api.refresh(&refresh_token).await {
            Ok(grant) => {
                let session = session_from_grant(grant, Some(refresh_token));
                let profile = inner
                    .roles
                    .profile()
                    .or_else(|| inner.records.load_profile());
                inner.records.write(&session, profile.as_ref());
                *inner.session.lock().expect("session state poisoned") = Some(session.clone());
                info!("session refreshed");
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "refresh failed, clearing session");
                inner.clear_local();
                Err(err.to_string())
            }
        }
    }

    fn clear_local(&self) {
        self.records.clear();
        *self.session.lock().expect("session state poisoned") = None;
        self.offline_unlocked.store(false, Ordering::SeqCst);
        self.roles.clear();
    }
}

/// Combine a token grant with the previous refresh token: servers may
/// rotate the refresh token or leave it in place.
fn session_from_grant(grant: TokenGrant, previous_refresh: Option<String>) -> Session {
    Session {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.or(previous_refresh),
        expires_at: grant.expires_at,
    }
}

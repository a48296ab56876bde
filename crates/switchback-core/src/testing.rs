//! Shared test doubles: a counting mock of the remote API and a fully
//! in-memory service wiring.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::api::{ApiError, AuthApi, LoginOutcome, TokenGrant};
use crate::crypto::CryptoService;
use crate::models::UserProfile;
use crate::roles::RoleResolver;
use crate::session::{SessionManager, SessionRecords};
use crate::store::memory::MemoryStore;
use crate::store::SecretStore;

pub(crate) fn profile() -> UserProfile {
    UserProfile {
        id: 1,
        name: "Ada".to_string(),
        email: "a@b.com".to_string(),
        role: "user".to_string(),
    }
}

/// Mock remote API. Login accepts the password "pw"; each refresh issues
/// the next token in the T1, T2, ... series.
pub(crate) struct MockApi {
    pub refresh_calls: AtomicUsize,
    pub require_second_factor: bool,
    pub issue_refresh_token: bool,
    pub refresh_delay_ms: u64,
    pub fail_refresh: AtomicBool,
    pub fail_logout: bool,
    pub fail_revoke: bool,
    pub fail_whoami: AtomicBool,
    pub whoami_role: Mutex<String>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            require_second_factor: false,
            issue_refresh_token: true,
            refresh_delay_ms: 0,
            fail_refresh: AtomicBool::new(false),
            fail_logout: false,
            fail_revoke: false,
            fail_whoami: AtomicBool::new(false),
            whoami_role: Mutex::new("user".to_string()),
        }
    }
}

#[async_trait]
impl AuthApi for MockApi {
    async fn login(
        &self,
        _identifier: &str,
        secret: &str,
        second_factor: Option<&str>,
    ) -> Result<LoginOutcome, ApiError> {
        if secret != "pw" {
            return Err(ApiError::Unauthorized);
        }
        if self.require_second_factor && second_factor.is_none() {
            return Ok(LoginOutcome::SecondFactorRequired);
        }
        Ok(LoginOutcome::Success {
            grant: TokenGrant {
                access_token: "T1".to_string(),
                refresh_token: self.issue_refresh_token.then(|| "R1".to_string()),
                expires_at: Some(Utc::now() + Duration::seconds(3600)),
            },
            profile: profile(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let serial = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.refresh_delay_ms)).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        Ok(TokenGrant {
            access_token: format!("T{}", serial + 1),
            refresh_token: Some(format!("R{}", serial + 1)),
            expires_at: Some(Utc::now() + Duration::seconds(3600)),
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        if self.fail_logout {
            return Err(ApiError::ServerError("revoke endpoint down".to_string()));
        }
        Ok(())
    }

    async fn whoami(&self, _access_token: &str) -> Result<UserProfile, ApiError> {
        if self.fail_whoami.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError("whoami endpoint down".to_string()));
        }
        let mut result = profile();
        result.role = self.whoami_role.lock().unwrap().clone();
        Ok(result)
    }

    async fn revoke_all(&self, _access_token: &str) -> Result<(), ApiError> {
        if self.fail_revoke {
            return Err(ApiError::ServerError("revoke-all endpoint down".to_string()));
        }
        Ok(())
    }
}

pub(crate) struct TestEnv {
    pub api: Arc<MockApi>,
    pub store: Arc<MemoryStore>,
    pub crypto: Arc<CryptoService>,
    pub records: Arc<SessionRecords>,
    pub roles: Arc<RoleResolver>,
    pub sessions: SessionManager,
}

pub(crate) fn env_with(api: MockApi) -> TestEnv {
    let api = Arc::new(api);
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn SecretStore> = store.clone();
    let crypto = Arc::new(CryptoService::from_seed(b"test-seed".to_vec()));
    let records = Arc::new(SessionRecords::new(store_dyn, crypto.clone()));
    let roles = Arc::new(RoleResolver::new(records.clone()));
    let sessions = SessionManager::new(api.clone(), records.clone(), roles.clone());
    TestEnv {
        api,
        store,
        crypto,
        records,
        roles,
        sessions,
    }
}

pub(crate) fn env() -> TestEnv {
    env_with(MockApi::new())
}

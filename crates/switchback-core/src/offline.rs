//! Offline credential enrollment and verification.
//!
//! Enrollment captures a locally verifiable secret while an online session
//! exists; verification later unlocks the cached identity with no network
//! access. Work that cannot run while offline is queued and reconciled
//! when connectivity returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::{CryptoError, CryptoService};
use crate::error::AuthError;
use crate::models::UserProfile;
use crate::session::SessionManager;
use crate::store::SecretStore;

/// Purpose id for offline credential encryption.
const OFFLINE_AUTH_PURPOSE: &str = "offline_auth";

/// Storage key for the enrollment record.
const KEY_OFFLINE_CREDENTIAL: &str = "offline_credential";

/// Storage key for the pending-change queue.
const KEY_PENDING_CHANGES: &str = "offline_pending_changes";

/// Enrollment record persisted through the secret store. Created only by
/// an explicit action while authenticated online, never silently mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineCredentialRecord {
    pub identifier: String,
    #[serde(rename = "encryptedSecret")]
    pub encrypted_secret: String,
    #[serde(rename = "profileSnapshot")]
    pub profile_snapshot: UserProfile,
    #[serde(rename = "enrolledAt")]
    pub enrolled_at: DateTime<Utc>,
}

/// Work queued while offline, reconciled when connectivity returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum PendingChange {
    /// Re-fetch the profile and rewrite the enrollment snapshot.
    RefreshProfileSnapshot,
}

pub struct OfflineCredentialService {
    store: Arc<dyn SecretStore>,
    crypto: Arc<CryptoService>,
    sessions: SessionManager,
}

impl OfflineCredentialService {
    pub fn new(
        store: Arc<dyn SecretStore>,
        crypto: Arc<CryptoService>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            store,
            crypto,
            sessions,
        }
    }

    /// Enroll a locally verifiable secret. Only callable while an
    /// authenticated online session exists; an offline unlock is not
    /// enough.
    pub fn enroll(
        &self,
        identifier: &str,
        secret: &str,
        profile: &UserProfile,
    ) -> Result<(), AuthError> {
        if !self.sessions.has_online_session() {
            return Err(AuthError::NotAuthenticated);
        }

        let record = OfflineCredentialRecord {
            identifier: identifier.to_string(),
            encrypted_secret: self.crypto.encrypt(secret, OFFLINE_AUTH_PURPOSE)?,
            profile_snapshot: profile.clone(),
            enrolled_at: Utc::now(),
        };
        self.persist_record(&record)?;
        info!(identifier, "offline credential enrolled");
        Ok(())
    }

    /// Non-failing existence probe, so callers can decide whether to offer
    /// the offline path at all.
    pub fn has_enrollment(&self) -> bool {
        self.store.has(KEY_OFFLINE_CREDENTIAL)
    }

    /// Verify a supplied secret against the enrollment. On a match the
    /// cached profile is returned and the local session is marked
    /// authenticated without any network call; a mismatch returns no
    /// profile data.
    pub fn verify(&self, supplied_secret: &str) -> Result<UserProfile, AuthError> {
        let record = self.load_record().ok_or(AuthError::InvalidCredentials)?;

        let stored = match self
            .crypto
            .decrypt(&record.encrypted_secret, OFFLINE_AUTH_PURPOSE)
        {
            Ok(secret) => secret,
            // Records from before the encrypted era hold the bare secret.
            Err(CryptoError::DecryptionFailed) | Err(CryptoError::InvalidCiphertext) => {
                debug!("offline secret not decryptable, comparing as legacy plaintext");
                record.encrypted_secret.clone()
            }
            Err(err) => return Err(err.into()),
        };

        if stored != supplied_secret {
            debug!("offline credential mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.sessions.mark_offline_unlocked(&record.profile_snapshot);
        self.queue_change(PendingChange::RefreshProfileSnapshot);
        info!(identifier = %record.identifier, "offline credential verified");
        Ok(record.profile_snapshot)
    }

    /// Reconcile queued work against the now-valid session. Invoked
    /// opportunistically when connectivity returns; failures are logged
    /// and retried on the next transition, never surfaced.
    pub async fn sync_pending_changes(&self) {
        let queue = self.load_queue();
        if queue.is_empty() {
            return;
        }

        let mut remaining = Vec::new();
        for change in queue {
            if let Err(err) = self.apply_change(&change).await {
                warn!(error = %err, "pending change failed, will retry");
                remaining.push(change);
            }
        }
        self.store_queue(&remaining);
    }

    async fn apply_change(&self, change: &PendingChange) -> Result<(), AuthError> {
        match change {
            PendingChange::RefreshProfileSnapshot => {
                let profile = self.sessions.fetch_profile().await?;
                if let Some(mut record) = self.load_record() {
                    record.profile_snapshot = profile;
                    self.persist_record(&record)?;
                }
                Ok(())
            }
        }
    }

    fn queue_change(&self, change: PendingChange) {
        let mut queue = self.load_queue();
        if !queue.contains(&change) {
            queue.push(change);
            self.store_queue(&queue);
        }
    }

    fn load_queue(&self) -> Vec<PendingChange> {
        self.store
            .read(KEY_PENDING_CHANGES)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    fn store_queue(&self, queue: &[PendingChange]) {
        if queue.is_empty() {
            self.store.erase(KEY_PENDING_CHANGES);
            return;
        }
        match serde_json::to_string(queue) {
            Ok(json) => self.store.write(KEY_PENDING_CHANGES, &json),
            Err(err) => warn!(error = %err, "failed to persist pending changes"),
        }
    }

    fn persist_record(&self, record: &OfflineCredentialRecord) -> Result<(), AuthError> {
        let json = serde_json::to_string(record)
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        self.store.write(KEY_OFFLINE_CREDENTIAL, &json);
        Ok(())
    }

    fn load_record(&self) -> Option<OfflineCredentialRecord> {
        let json = self.store.read(KEY_OFFLINE_CREDENTIAL)?;
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "offline credential record unreadable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{env, profile, TestEnv};
    use std::sync::atomic::Ordering;

    fn service(env: &TestEnv) -> OfflineCredentialService {
        OfflineCredentialService::new(
            env.store.clone(),
            env.crypto.clone(),
            env.sessions.clone(),
        )
    }

    #[tokio::test]
    async fn test_enroll_requires_authentication() {
        let env = env();
        let offline = service(&env);

        let err = offline.enroll("a@b.com", "correct", &profile()).unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
        assert!(!offline.has_enrollment());
    }

    #[tokio::test]
    async fn test_verify_accepts_the_right_secret() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);
        offline.enroll("a@b.com", "correct", &profile()).unwrap();

        // Back to anonymous, as after a restart with no network.
        env.sessions.logout().await;
        assert!(!env.sessions.is_authenticated());

        let verified = offline.verify("correct").expect("verification succeeds");
        assert_eq!(verified, profile());
        assert!(env.sessions.is_authenticated());
    }

    #[tokio::test]
    async fn test_verify_rejects_a_wrong_secret() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);
        offline.enroll("a@b.com", "correct", &profile()).unwrap();
        env.sessions.logout().await;

        let err = offline.verify("wrong").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(!env.sessions.is_authenticated());
    }

    #[tokio::test]
    async fn test_verify_without_enrollment_fails() {
        let env = env();
        let offline = service(&env);
        assert!(!offline.has_enrollment());
        assert!(matches!(
            offline.verify("anything"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_secret_is_encrypted_at_rest() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);
        offline.enroll("a@b.com", "correct", &profile()).unwrap();

        let raw = env.store.read(KEY_OFFLINE_CREDENTIAL).unwrap();
        assert!(!raw.contains("correct"));
    }

    #[tokio::test]
    async fn test_sync_refreshes_the_profile_snapshot() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);
        offline.enroll("a@b.com", "correct", &profile()).unwrap();

        // Offline unlock queues a snapshot refresh.
        offline.verify("correct").unwrap();

        // Connectivity returns with a changed role on the server.
        *env.api.whoami_role.lock().unwrap() = "admin".to_string();
        offline.sync_pending_changes().await;

        let record = offline.load_record().expect("record present");
        assert_eq!(record.profile_snapshot.role, "admin");
        assert!(!env.store.has(KEY_PENDING_CHANGES));
    }

    #[tokio::test]
    async fn test_sync_failure_retains_the_queue() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);
        offline.enroll("a@b.com", "correct", &profile()).unwrap();
        offline.verify("correct").unwrap();

        env.api.fail_whoami.store(true, Ordering::SeqCst);
        offline.sync_pending_changes().await;
        assert!(env.store.has(KEY_PENDING_CHANGES));

        // The next transition succeeds and drains the queue.
        env.api.fail_whoami.store(false, Ordering::SeqCst);
        offline.sync_pending_changes().await;
        assert!(!env.store.has(KEY_PENDING_CHANGES));
    }

    #[tokio::test]
    async fn test_legacy_plaintext_secret_still_verifies() {
        let env = env();
        env.sessions.login("a@b.com", "pw", None).await.unwrap();
        let offline = service(&env);

        // A record from before secrets were encrypted.
        let legacy = OfflineCredentialRecord {
            identifier: "a@b.com".to_string(),
            encrypted_secret: "correct".to_string(),
            profile_snapshot: profile(),
            enrolled_at: Utc::now(),
        };
        offline.persist_record(&legacy).unwrap();

        assert!(offline.verify("correct").is_ok());
        assert!(matches!(
            offline.verify("wrong"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}

//! Error types surfaced at the subsystem boundary.

use thiserror::Error;

use crate::api::ApiError;
use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Login needs a second-factor code; re-prompt and retry.
    #[error("second factor required")]
    SecondFactorRequired,

    /// Login or offline verification rejected; re-prompt.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An authenticated operation was attempted without a session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The refresh token was rejected or unusable; local session state has
    /// been cleared and the user must log in again.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// Stored ciphertext was unreadable.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A remote call failed. Transient network errors are safe to retry.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("internal error: {0}")]
    Internal(String),
}

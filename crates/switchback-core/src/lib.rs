//! Core library for switchback - secure session lifecycle, encrypted
//! credential storage and offline authentication.
//!
//! This crate provides:
//! - `SessionManager`: login, expiry-aware token access, single-flight
//!   refresh, logout and revocation
//! - `CryptoService`: per-purpose key derivation and authenticated
//!   encryption of everything persisted
//! - `OfflineCredentialService`: enrollment and verification of a locally
//!   checkable secret that works with no network
//! - `store`: platform keystore persistence with a file fallback
//! - `RoleResolver`: cached role checks for the signed-in user
//!
//! Services are constructed once at process start and shared by
//! reference:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switchback_core::api::HttpAuthApi;
//! use switchback_core::config::{self, Config};
//! use switchback_core::crypto::CryptoService;
//! use switchback_core::roles::RoleResolver;
//! use switchback_core::session::{SessionManager, SessionRecords};
//! use switchback_core::store;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let secrets = store::open_default(config::APP_NAME);
//! let crypto = Arc::new(CryptoService::for_platform(secrets.as_ref()));
//! let records = Arc::new(SessionRecords::new(secrets.clone(), crypto.clone()));
//! let roles = Arc::new(RoleResolver::new(records.clone()));
//! let api = Arc::new(HttpAuthApi::new(config.api_base_url())?);
//! let sessions = SessionManager::new(api, records, roles);
//! sessions.restore();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod models;
pub mod offline;
pub mod roles;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, AuthApi, HttpAuthApi, LoginOutcome, TokenGrant};
pub use config::Config;
pub use crypto::{CryptoError, CryptoService};
pub use device::DeviceIdentity;
pub use error::AuthError;
pub use models::{Session, UserProfile};
pub use offline::{OfflineCredentialRecord, OfflineCredentialService};
pub use roles::RoleResolver;
pub use session::{SessionManager, SessionRecords};

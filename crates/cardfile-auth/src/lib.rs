//! Identity and access control for Cardfile.
//!
//! This crate is the security core of the system:
//! - Password hashing and verification (Argon2id)
//! - Signed, time-limited tokens in three classes (access, refresh, confirm)
//! - Role ladder and per-operation role requirements
//! - Rate-limit gate consulted before any sensitive work
//! - Account lifecycle: signup, email confirmation, login, refresh, logout
//!
//! It is intentionally decoupled from HTTP and from any concrete storage
//! engine; collaborators arrive through the capability traits in
//! [`store`], [`limiter`], [`avatar`], and [`mailer`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod avatar;
pub mod lifecycle;
pub mod limiter;
pub mod mailer;
pub mod password;
pub mod roles;
pub mod store;
pub mod token;

pub use avatar::{AvatarLookup, Gravatar};
pub use lifecycle::{AccountLifecycle, Credentials, SignupRequest};
pub use limiter::{FixedWindowGate, RateLimiterGate};
pub use mailer::{ConfirmationEmail, ConfirmationMailer, TracingMailer};
pub use roles::{Role, RoleRequirement, authorize};
pub use store::{Account, AccountProfile, CredentialStore, MemoryCredentialStore, NewAccount, StoreError};
pub use token::{Claims, TokenClass, TokenPair, TokenService};

use std::time::Duration;

use cardfile_core::ValidationError;
use thiserror::Error;

/// Authentication and authorization errors.
///
/// This is a closed taxonomy: every user-input-driven failure in the
/// identity layer surfaces as one of these kinds. Secrets (passwords,
/// hashes, token strings) never appear in any variant's payload.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signup attempted with an email that already has an account.
    #[error("Account already exists")]
    AccountExists,

    /// Login attempted with an email no account matches.
    #[error("Invalid email")]
    InvalidEmail,

    /// Login attempted with a password that does not match the stored hash.
    #[error("Invalid password")]
    InvalidPassword,

    /// Login attempted before the account's email was confirmed.
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Confirmation token malformed, expired, or bound to no account.
    #[error("Verification error")]
    InvalidConfirmationToken,

    /// Token presented past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// Token structure or signature invalid.
    #[error("Malformed token")]
    TokenMalformed,

    /// Token signed for a different class than the operation requires.
    #[error("Wrong token class, expected {expected}")]
    TokenWrongClass {
        /// The class the operation required.
        expected: TokenClass,
    },

    /// Refresh token no longer matches the value stored on the account.
    #[error("Invalid refresh token")]
    RefreshTokenRevoked,

    /// Caller presented no credential, or one that failed verification.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Caller is authenticated but its role is not permitted the operation.
    #[error("Operation forbidden")]
    Forbidden,

    /// Too many requests from this client within the window.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// How long the client should wait before retrying.
        retry_after: Duration,
    },

    /// A user-supplied field failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Credential store failure. Fatal to the request, not to the process.
    #[error("Storage error: {0}")]
    Store(String),

    /// Signing-key or hasher misconfiguration. Fatal to the request.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::AccountExists,
            StoreError::Missing => Self::Store("account record vanished".to_string()),
            StoreError::Unavailable(msg) => Self::Store(msg),
        }
    }
}

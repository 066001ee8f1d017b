//! Account model and credential-store capability.
//!
//! The store is external to the identity core; this module defines the
//! interface plus an in-memory implementation used for tests and small
//! deployments. A sled-backed implementation lives in the gateway crate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cardfile_core::AccountId;

use crate::roles::Role;

/// Account record as persisted by the credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned id.
    pub id: AccountId,
    /// Unique, case-normalized email.
    pub email: String,
    /// Display name.
    pub username: String,
    /// Argon2 password hash (persisted, never exposed in the public API).
    pub password_hash: String,
    /// Role; `user` unless an administrative action says otherwise.
    pub role: Role,
    /// Whether the account's email has been confirmed. Never reverts.
    pub confirmed: bool,
    /// Serialized form of the most recently issued refresh token, or None
    /// if the account never logged in or has logged out.
    pub refresh_token: Option<String>,
    /// Avatar URL owned by the external image host.
    pub avatar_url: Option<String>,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Projection safe for API responses: no password hash, no refresh token.
    #[must_use]
    pub fn to_profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
            confirmed: self.confirmed,
            avatar_url: self.avatar_url.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public account representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Store-assigned id.
    pub id: AccountId,
    /// Email address.
    pub email: String,
    /// Display name.
    pub username: String,
    /// Role.
    pub role: Role,
    /// Confirmation status.
    pub confirmed: bool,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields of an account not yet assigned an id.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Normalized email.
    pub email: String,
    /// Sanitized display name.
    pub username: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Initial role.
    pub role: Role,
    /// Avatar URL derived at signup.
    pub avatar_url: Option<String>,
}

/// Credential-store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Insert lost the uniqueness race or the email is already taken.
    #[error("account already exists")]
    Duplicate,

    /// Update targeted an account that is no longer present.
    #[error("account not found")]
    Missing,

    /// Infrastructure failure; fatal to the request, not the process.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence capability for account records.
///
/// Implementations are internally synchronized; every method is a single
/// atomic read-modify-write against one record. `insert` must admit exactly
/// one winner per email under concurrency.
pub trait CredentialStore: Send + Sync {
    /// Look up an account by normalized email.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` on infrastructure failure.
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a new account, assigning its id and creation timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the email is taken.
    fn insert(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Persist a mutated account record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Missing` if the record vanished.
    fn update(&self, account: &Account) -> Result<(), StoreError>;
}

/// In-memory credential store keyed by normalized email.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<String, Account>>,
    next_id: AtomicU64,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts held.
    ///
    /// # Panics
    ///
    /// Panics if the interior lock is poisoned.
    #[must_use]
    pub fn count(&self) -> usize {
        self.accounts.read().expect("account map lock").len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| StoreError::Unavailable("account map lock poisoned".into()))?;
        Ok(accounts.get(email).cloned())
    }

    fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StoreError::Unavailable("account map lock poisoned".into()))?;

        // The write lock spans the check and the insert, so concurrent
        // signups with the same email see exactly one winner.
        if accounts.contains_key(&account.email) {
            return Err(StoreError::Duplicate);
        }

        let id = AccountId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let record = Account {
            id,
            email: account.email.clone(),
            username: account.username,
            password_hash: account.password_hash,
            role: account.role,
            confirmed: false,
            refresh_token: None,
            avatar_url: account.avatar_url,
            created_at: Utc::now(),
        };

        accounts.insert(account.email, record.clone());
        Ok(record)
    }

    fn update(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StoreError::Unavailable("account map lock poisoned".into()))?;

        match accounts.get_mut(&account.email) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(StoreError::Missing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: "alice".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::User,
            avatar_url: None,
        }
    }

    #[test]
    fn insert_assigns_id_and_defaults() {
        let store = MemoryCredentialStore::new();
        let account = store.insert(new_account("a@x.com")).unwrap();

        assert_eq!(account.id.as_u64(), 1);
        assert!(!account.confirmed);
        assert!(account.refresh_token.is_none());

        let found = store.find_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(found.id, account.id);
    }

    #[test]
    fn duplicate_email_rejected() {
        let store = MemoryCredentialStore::new();
        store.insert(new_account("a@x.com")).unwrap();

        let mut second = new_account("a@x.com");
        second.username = "other".to_string();
        assert!(matches!(store.insert(second), Err(StoreError::Duplicate)));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn concurrent_inserts_have_one_winner() {
        let store = std::sync::Arc::new(MemoryCredentialStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.insert(new_account("race@x.com")).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn update_roundtrips() {
        let store = MemoryCredentialStore::new();
        let mut account = store.insert(new_account("a@x.com")).unwrap();

        account.confirmed = true;
        account.refresh_token = Some("serialized-token".to_string());
        store.update(&account).unwrap();

        let found = store.find_by_email("a@x.com").unwrap().unwrap();
        assert!(found.confirmed);
        assert_eq!(found.refresh_token.as_deref(), Some("serialized-token"));
    }

    #[test]
    fn update_missing_account_errors() {
        let store = MemoryCredentialStore::new();
        let account = Account {
            id: AccountId::new(99),
            email: "ghost@x.com".to_string(),
            username: "ghost".to_string(),
            password_hash: String::new(),
            role: Role::User,
            confirmed: false,
            refresh_token: None,
            avatar_url: None,
            created_at: Utc::now(),
        };
        assert_eq!(store.update(&account), Err(StoreError::Missing));
    }

    #[test]
    fn profile_omits_secrets() {
        let store = MemoryCredentialStore::new();
        let account = store.insert(new_account("a@x.com")).unwrap();
        let profile = account.to_profile();

        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("refresh_token"));
    }
}

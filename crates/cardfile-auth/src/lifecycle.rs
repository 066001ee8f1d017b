//! Account lifecycle controller.
//!
//! Orchestrates signup, email confirmation, login, session refresh, logout,
//! and current-account resolution over the capability traits. Holds no locks
//! of its own: the store and the rate gate are the only shared mutable state
//! and both are internally synchronized.
//!
//! Session state is not modeled on the account. A login overwrites the
//! account's stored refresh-token value, invalidating every previously
//! issued refresh token; that comparison is the only revocation mechanism
//! for otherwise stateless signed tokens, so outstanding access tokens stay
//! valid until natural expiry.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use cardfile_core::{normalize_email, sanitize_display_name};

use crate::AuthError;
use crate::avatar::AvatarLookup;
use crate::limiter::RateLimiterGate;
use crate::mailer::{ConfirmationEmail, ConfirmationMailer};
use crate::password::{hash_password, verify_password};
use crate::roles::Role;
use crate::store::{Account, AccountProfile, CredentialStore, NewAccount};
use crate::token::{TokenClass, TokenPair, TokenService};

/// Route keys under which the lifecycle consults the rate gate.
pub mod routes {
    /// Signup route key.
    pub const SIGNUP: &str = "auth.signup";
    /// Login route key.
    pub const LOGIN: &str = "auth.login";
    /// Refresh route key.
    pub const REFRESH: &str = "auth.refresh";
    /// Email-confirmation route key.
    pub const CONFIRM: &str = "auth.confirm";
}

/// Per-window budget the lifecycle presents to the gate.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    /// Allowed requests per window.
    pub requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Signup input.
pub struct SignupRequest {
    /// Requested email address (normalized before use).
    pub email: String,
    /// Requested display name (sanitized before use).
    pub username: String,
    /// Plaintext password; hashed immediately, never stored or logged.
    pub password: SecretString,
}

/// Login input.
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: SecretString,
}

/// The account lifecycle state machine: `Unconfirmed → Confirmed`, with
/// session state governed by token issuance and invalidation.
pub struct AccountLifecycle {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    gate: Arc<dyn RateLimiterGate>,
    avatars: Arc<dyn AvatarLookup>,
    mailer: Arc<dyn ConfirmationMailer>,
    policy: RatePolicy,
}

impl AccountLifecycle {
    /// Assemble the controller from its collaborators.
    ///
    /// Called once from the composition root; handlers receive the
    /// controller by reference rather than reaching for globals.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        gate: Arc<dyn RateLimiterGate>,
        avatars: Arc<dyn AvatarLookup>,
        mailer: Arc<dyn ConfirmationMailer>,
        policy: RatePolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            gate,
            avatars,
            mailer,
            policy,
        }
    }

    /// The token service backing this controller.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    fn consult_gate(&self, route: &str, client: &str) -> Result<(), AuthError> {
        self.gate
            .allow(route, client, self.policy.requests, self.policy.window)
            .map_err(|retry_after| AuthError::RateLimited { retry_after })
    }

    /// Register a new account.
    ///
    /// The new account starts unconfirmed with role `user`. A confirmation
    /// email is dispatched fire-and-forget; dispatch failure never fails the
    /// signup. The returned projection carries no password material.
    ///
    /// # Errors
    ///
    /// - `AuthError::RateLimited` when the gate denies the client
    /// - `AuthError::Validation` for an unusable email or display name
    /// - `AuthError::AccountExists` when the email already has an account,
    ///   including when a concurrent signup wins the insert race
    pub fn signup(&self, client: &str, request: SignupRequest) -> Result<AccountProfile, AuthError> {
        self.consult_gate(routes::SIGNUP, client)?;

        let email = normalize_email(&request.email)?;
        let username = sanitize_display_name(&request.username)?;

        if self.store.find_by_email(&email)?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let password_hash = hash_password(request.password.expose_secret())?;
        let avatar_url = Some(self.avatars.image_url_for(&email));

        // The store's uniqueness constraint is the real arbiter; a
        // concurrent signup that slipped past the lookup above surfaces as
        // Duplicate here and maps to AccountExists.
        let account = self.store.insert(NewAccount {
            email,
            username,
            password_hash,
            role: Role::User,
            avatar_url,
        })?;

        match self.tokens.issue_confirmation(&account.email) {
            Ok(token) => self.mailer.send_confirmation(ConfirmationEmail {
                to: account.email.clone(),
                username: account.username.clone(),
                token,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "confirmation token issuance failed, dispatch skipped");
            }
        }

        tracing::info!(account = %account.id, "account created");
        Ok(account.to_profile())
    }

    /// Confirm an account's email from a confirm-class token.
    ///
    /// Idempotent: confirming an already-confirmed account is a no-op
    /// success.
    ///
    /// # Errors
    ///
    /// - `AuthError::RateLimited` when the gate denies the client
    /// - `AuthError::InvalidConfirmationToken` for a malformed or expired
    ///   token, or one whose subject resolves to no account
    pub fn confirm_email(&self, client: &str, token: &str) -> Result<(), AuthError> {
        self.consult_gate(routes::CONFIRM, client)?;

        let subject = self
            .tokens
            .verify(token, TokenClass::Confirm)
            .map_err(|_| AuthError::InvalidConfirmationToken)?;

        let mut account = self
            .store
            .find_by_email(&subject)?
            .ok_or(AuthError::InvalidConfirmationToken)?;

        if account.confirmed {
            return Ok(());
        }

        account.confirmed = true;
        self.store.update(&account)?;
        tracing::info!(account = %account.id, "email confirmed");
        Ok(())
    }

    /// Authenticate and open a session.
    ///
    /// Confirmation status is checked before the password hash so the
    /// timing of the comparison cannot be used to probe whether an account
    /// is confirmed. On success the refresh token's serialized value is
    /// persisted on the account, overwriting any prior value — one live
    /// refresh chain per account.
    ///
    /// # Errors
    ///
    /// - `AuthError::RateLimited` when the gate denies the client
    /// - `AuthError::InvalidEmail` when no account matches
    /// - `AuthError::EmailNotConfirmed` before confirmation
    /// - `AuthError::InvalidPassword` on hash mismatch
    pub fn login(&self, client: &str, credentials: Credentials) -> Result<TokenPair, AuthError> {
        self.consult_gate(routes::LOGIN, client)?;

        let email = normalize_email(&credentials.email).map_err(|_| AuthError::InvalidEmail)?;

        let mut account = self
            .store
            .find_by_email(&email)?
            .ok_or(AuthError::InvalidEmail)?;

        if !account.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }

        if !verify_password(credentials.password.expose_secret(), &account.password_hash) {
            return Err(AuthError::InvalidPassword);
        }

        let pair = self.tokens.issue_pair(&account.email)?;
        account.refresh_token = Some(pair.refresh_token.clone());
        self.store.update(&account)?;

        tracing::info!(account = %account.id, "login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh access/refresh pair.
    ///
    /// Beyond cryptographic verification, the presented token must equal the
    /// value stored on the account. A mismatch means the token was rotated
    /// away (or the chain was stolen); the stored value is cleared so the
    /// whole chain dies, and the caller must log in again.
    ///
    /// # Errors
    ///
    /// - `AuthError::RateLimited` when the gate denies the client
    /// - `AuthError::TokenExpired` / `TokenMalformed` / `TokenWrongClass`
    ///   from verification
    /// - `AuthError::Unauthenticated` when the subject no longer resolves
    /// - `AuthError::RefreshTokenRevoked` on comparison mismatch
    pub fn refresh_session(&self, client: &str, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.consult_gate(routes::REFRESH, client)?;

        let subject = self.tokens.verify(refresh_token, TokenClass::Refresh)?;

        let mut account = self
            .store
            .find_by_email(&subject)?
            .ok_or(AuthError::Unauthenticated)?;

        if account.refresh_token.as_deref() != Some(refresh_token) {
            account.refresh_token = None;
            self.store.update(&account)?;
            tracing::warn!(account = %account.id, "stale refresh token presented, chain revoked");
            return Err(AuthError::RefreshTokenRevoked);
        }

        let pair = self.tokens.issue_pair(&account.email)?;
        account.refresh_token = Some(pair.refresh_token.clone());
        self.store.update(&account)?;

        Ok(pair)
    }

    /// Close the caller's session.
    ///
    /// Clears the stored refresh value, so future refresh attempts fail.
    /// Outstanding access tokens remain valid until their own expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the access token does not
    /// resolve to an account.
    pub fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let mut account = self.current_account(access_token)?;
        account.refresh_token = None;
        self.store.update(&account)?;
        tracing::info!(account = %account.id, "logged out");
        Ok(())
    }

    /// Resolve the account behind a presented access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` for any verification failure or
    /// when the subject no longer resolves to an account.
    pub fn current_account(&self, access_token: &str) -> Result<Account, AuthError> {
        let subject = self
            .tokens
            .verify(access_token, TokenClass::Access)
            .map_err(|_| AuthError::Unauthenticated)?;

        self.store
            .find_by_email(&subject)?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Overwrite the avatar URL for an account.
    ///
    /// The only mutation path for that field; the URL itself belongs to the
    /// external image host.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` when the email resolves to no
    /// account.
    pub fn update_avatar(&self, email: &str, url: String) -> Result<AccountProfile, AuthError> {
        let mut account = self
            .store
            .find_by_email(email)?
            .ok_or(AuthError::Unauthenticated)?;

        account.avatar_url = Some(url);
        self.store.update(&account)?;
        Ok(account.to_profile())
    }
}

impl std::fmt::Debug for AccountLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLifecycle")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::Gravatar;
    use crate::limiter::FixedWindowGate;
    use crate::store::MemoryCredentialStore;
    use std::sync::Mutex;

    /// Mailer that captures outgoing messages for inspection.
    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<ConfirmationEmail>>,
    }

    impl CapturingMailer {
        fn last_token(&self) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .last()
                .map(|m| m.token.clone())
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl ConfirmationMailer for CapturingMailer {
        fn send_confirmation(&self, message: ConfirmationEmail) {
            self.sent.lock().unwrap().push(message);
        }
    }

    struct Harness {
        lifecycle: AccountLifecycle,
        store: Arc<MemoryCredentialStore>,
        mailer: Arc<CapturingMailer>,
    }

    fn harness() -> Harness {
        harness_with_policy(RatePolicy {
            requests: 1000,
            window: Duration::from_secs(60),
        })
    }

    fn harness_with_policy(policy: RatePolicy) -> Harness {
        let store = Arc::new(MemoryCredentialStore::new());
        let mailer = Arc::new(CapturingMailer::default());
        let secret = TokenService::generate_secret();
        let tokens = Arc::new(TokenService::new(
            &secret,
            Duration::from_secs(900),
            Duration::from_secs(7 * 86_400),
            Duration::from_secs(72 * 3600),
        ));

        let lifecycle = AccountLifecycle::new(
            store.clone(),
            tokens,
            Arc::new(FixedWindowGate::new()),
            Arc::new(Gravatar::new()),
            mailer.clone(),
            policy,
        );

        Harness {
            lifecycle,
            store,
            mailer,
        }
    }

    fn signup(h: &Harness, email: &str, username: &str, password: &str) -> Result<AccountProfile, AuthError> {
        h.lifecycle.signup(
            "10.0.0.1",
            SignupRequest {
                email: email.to_string(),
                username: username.to_string(),
                password: SecretString::from(password),
            },
        )
    }

    fn login(h: &Harness, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        h.lifecycle.login(
            "10.0.0.1",
            Credentials {
                email: email.to_string(),
                password: SecretString::from(password),
            },
        )
    }

    fn confirm_via_mailer(h: &Harness) {
        let token = h.mailer.last_token().expect("confirmation email sent");
        h.lifecycle.confirm_email("10.0.0.1", &token).unwrap();
    }

    #[test]
    fn full_lifecycle_scenario() {
        let h = harness();

        // Signup leaves one unconfirmed account in the store.
        let profile = signup(&h, "a@x.com", "alice", "secret1").unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert_eq!(profile.role, Role::User);
        assert!(!profile.confirmed);
        assert_eq!(h.store.count(), 1);
        assert!(profile.avatar_url.is_some());

        // Login before confirmation is refused even with the right password.
        assert!(matches!(
            login(&h, "a@x.com", "secret1"),
            Err(AuthError::EmailNotConfirmed)
        ));

        // Confirm via the token that went out in the email.
        confirm_via_mailer(&h);
        assert!(h.store.find_by_email("a@x.com").unwrap().unwrap().confirmed);

        // Now login yields a bearer pair.
        let pair = login(&h, "a@x.com", "secret1").unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        // Wrong password and unknown email keep their distinct kinds.
        assert!(matches!(
            login(&h, "a@x.com", "wrong"),
            Err(AuthError::InvalidPassword)
        ));
        assert!(matches!(
            login(&h, "nobody@x.com", "secret1"),
            Err(AuthError::InvalidEmail)
        ));
    }

    #[test]
    fn duplicate_signup_rejected_regardless_of_other_fields() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();

        assert!(matches!(
            signup(&h, "a@x.com", "someone-else", "other-password"),
            Err(AuthError::AccountExists)
        ));
        // Email comparison is case-insensitive.
        assert!(matches!(
            signup(&h, "A@X.COM", "alice", "secret1"),
            Err(AuthError::AccountExists)
        ));
        assert_eq!(h.store.count(), 1);
    }

    #[test]
    fn signup_dispatches_exactly_one_confirmation() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        assert_eq!(h.mailer.count(), 1);

        // The failed duplicate attempt sends nothing.
        let _ = signup(&h, "a@x.com", "alice", "secret1");
        assert_eq!(h.mailer.count(), 1);
    }

    #[test]
    fn confirmation_is_idempotent() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();

        let token = h.mailer.last_token().unwrap();
        h.lifecycle.confirm_email("c", &token).unwrap();
        // Second confirmation with the same token: no-op success.
        h.lifecycle.confirm_email("c", &token).unwrap();
        assert!(h.store.find_by_email("a@x.com").unwrap().unwrap().confirmed);
    }

    #[test]
    fn garbage_confirmation_token_rejected() {
        let h = harness();
        assert!(matches!(
            h.lifecycle.confirm_email("c", "not-a-token"),
            Err(AuthError::InvalidConfirmationToken)
        ));
    }

    #[test]
    fn access_token_does_not_confirm() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);
        let pair = login(&h, "a@x.com", "secret1").unwrap();

        // Wrong class: an access token is useless as a confirmation token.
        assert!(matches!(
            h.lifecycle.confirm_email("c", &pair.access_token),
            Err(AuthError::InvalidConfirmationToken)
        ));
    }

    #[test]
    fn login_overwrites_previous_refresh_chain() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);

        let first = login(&h, "a@x.com", "secret1").unwrap();
        let second = login(&h, "a@x.com", "secret1").unwrap();

        // The first session's refresh token was rotated away by the second
        // login.
        assert!(matches!(
            h.lifecycle.refresh_session("c", &first.refresh_token),
            Err(AuthError::RefreshTokenRevoked)
        ));
        // Clearing on mismatch kills the whole chain, second included.
        assert!(matches!(
            h.lifecycle.refresh_session("c", &second.refresh_token),
            Err(AuthError::RefreshTokenRevoked)
        ));
    }

    #[test]
    fn refresh_rotates_and_old_token_dies() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);
        let pair = login(&h, "a@x.com", "secret1").unwrap();

        let rotated = h.lifecycle.refresh_session("c", &pair.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_eq!(rotated.token_type, "bearer");

        // The pre-rotation token no longer matches the stored value.
        assert!(matches!(
            h.lifecycle.refresh_session("c", &pair.refresh_token),
            Err(AuthError::RefreshTokenRevoked)
        ));
    }

    #[test]
    fn access_token_cannot_refresh() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);
        let pair = login(&h, "a@x.com", "secret1").unwrap();

        assert!(matches!(
            h.lifecycle.refresh_session("c", &pair.access_token),
            Err(AuthError::TokenWrongClass { expected: TokenClass::Refresh })
        ));
    }

    #[test]
    fn logout_invalidates_refresh_but_not_access() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);
        let pair = login(&h, "a@x.com", "secret1").unwrap();

        h.lifecycle.logout(&pair.access_token).unwrap();

        assert!(matches!(
            h.lifecycle.refresh_session("c", &pair.refresh_token),
            Err(AuthError::RefreshTokenRevoked)
        ));
        // Stateless access tokens run to natural expiry.
        assert!(h.lifecycle.current_account(&pair.access_token).is_ok());
    }

    #[test]
    fn current_account_resolution() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        confirm_via_mailer(&h);
        let pair = login(&h, "a@x.com", "secret1").unwrap();

        let account = h.lifecycle.current_account(&pair.access_token).unwrap();
        assert_eq!(account.email, "a@x.com");

        assert!(matches!(
            h.lifecycle.current_account("garbage"),
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            h.lifecycle.current_account(&pair.refresh_token),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn signup_rate_limited_after_budget() {
        let h = harness_with_policy(RatePolicy {
            requests: 2,
            window: Duration::from_secs(60),
        });

        signup(&h, "a@x.com", "alice", "secret1").unwrap();
        signup(&h, "b@x.com", "bob", "secret2").unwrap();

        let denied = signup(&h, "c@x.com", "carol", "secret3");
        assert!(matches!(denied, Err(AuthError::RateLimited { .. })));
        // The store was never touched for the denied request.
        assert_eq!(h.store.count(), 2);
    }

    #[test]
    fn invalid_signup_email_rejected() {
        let h = harness();
        assert!(matches!(
            signup(&h, "not-an-email", "alice", "secret1"),
            Err(AuthError::Validation(_))
        ));
        assert_eq!(h.store.count(), 0);
    }

    #[test]
    fn update_avatar_overwrites_url() {
        let h = harness();
        signup(&h, "a@x.com", "alice", "secret1").unwrap();

        let profile = h
            .lifecycle
            .update_avatar("a@x.com", "https://images.example/alice.png".to_string())
            .unwrap();
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://images.example/alice.png")
        );
    }
}

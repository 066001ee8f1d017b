//! Token issuance and verification.
//!
//! Tokens come in three classes — access, refresh, and confirm — signed over
//! the same claim shape. The class discriminator lives inside the signed
//! payload, so presenting a token of one class where another is expected
//! fails verification rather than being silently accepted. Verification is
//! purely cryptographic and never consults the credential store; revocation
//! before natural expiry exists only through the refresh-token comparison in
//! the lifecycle controller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Token class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    /// Short-lived token for API calls.
    #[default]
    Access,
    /// Long-lived token for minting new access tokens.
    Refresh,
    /// Single-purpose token bound into a confirmation email.
    Confirm,
}

impl std::fmt::Display for TokenClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
            Self::Confirm => write!(f, "confirm"),
        }
    }
}

/// Signed token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account's normalized email.
    pub sub: String,
    /// Token class discriminator (covered by the signature).
    pub scope: TokenClass,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Random nonce; present on refresh tokens so each rotation yields a
    /// distinct serialized value even within the same second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// An access/refresh pair as returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
    /// Scheme name handed back to callers (always `"bearer"`).
    pub token_type: String,
}

/// Service for creating and verifying signed tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
    confirm_expiry: Duration,
}

impl TokenService {
    /// Create a new token service with a raw secret key.
    ///
    /// The secret should be at least 32 bytes.
    #[must_use]
    pub fn new(
        secret: &[u8],
        access_expiry: Duration,
        refresh_expiry: Duration,
        confirm_expiry: Duration,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_expiry,
            refresh_expiry,
            confirm_expiry,
        }
    }

    /// Create a token service from a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if hex decoding fails.
    pub fn from_hex_secret(
        hex_secret: &str,
        access_expiry: Duration,
        refresh_expiry: Duration,
        confirm_expiry: Duration,
    ) -> Result<Self, AuthError> {
        let secret = hex::decode(hex_secret)
            .map_err(|e| AuthError::Config(format!("Invalid hex secret: {e}")))?;
        Ok(Self::new(&secret, access_expiry, refresh_expiry, confirm_expiry))
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as a hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    /// Issue an access token for a subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` on signing failure; issuance has no
    /// user-input failure mode.
    pub fn issue_access(&self, subject: &str) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue(subject, TokenClass::Access, self.access_expiry, None)
    }

    /// Issue a refresh token for a subject.
    ///
    /// Carries a random nonce so every issuance is a distinct string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` on signing failure.
    pub fn issue_refresh(&self, subject: &str) -> Result<(String, DateTime<Utc>), AuthError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.issue(
            subject,
            TokenClass::Refresh,
            self.refresh_expiry,
            Some(hex::encode(nonce)),
        )
    }

    /// Issue an email-confirmation token for a subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` on signing failure.
    pub fn issue_confirmation(&self, subject: &str) -> Result<String, AuthError> {
        self.issue(subject, TokenClass::Confirm, self.confirm_expiry, None)
            .map(|(token, _)| token)
    }

    /// Issue an access/refresh pair for a subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` on signing failure.
    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair, AuthError> {
        let (access_token, expires_at) = self.issue_access(subject)?;
        let (refresh_token, refresh_expires_at) = self.issue_refresh(subject)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
            refresh_expires_at,
            token_type: "bearer".to_string(),
        })
    }

    fn issue(
        &self,
        subject: &str,
        scope: TokenClass,
        expiry: Duration,
        jti: Option<String>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let exp = now + chrono::Duration::from_std(expiry).unwrap_or_default();

        let claims = Claims {
            sub: subject.to_string(),
            scope,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Config(format!("Token encoding failed: {e}")))?;

        Ok((token, exp))
    }

    /// Verify a token against an expected class and return its subject.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenExpired` past the token's expiry
    /// - `AuthError::TokenMalformed` on a bad signature or structure
    /// - `AuthError::TokenWrongClass` when the signed class differs from
    ///   `expected`
    pub fn verify(&self, token: &str, expected: TokenClass) -> Result<String, AuthError> {
        let claims = self.decode(token)?;

        if claims.scope != expected {
            return Err(AuthError::TokenWrongClass { expected });
        }

        Ok(claims.sub)
    }

    /// Decode and validate a token without a class check.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` or `AuthError::TokenMalformed`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed,
            })?;

        Ok(data.claims)
    }

    /// Extract the token from an `Authorization` header value.
    ///
    /// Expects format: `Bearer <token>`.
    #[must_use]
    pub fn extract_bearer(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .field("confirm_expiry", &self.confirm_expiry)
            .finish_non_exhaustive()
    }
}

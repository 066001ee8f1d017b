//! Request extractors, error mapping, and the per-client throttle.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    Json,
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde_json::json;

use cardfile_auth::{Account, AuthError, Role, TokenService};
use cardfile_contacts::ContactError;

use crate::server::AppState;

/// API error with the transport-level status mapping.
///
/// The response body is `{"detail": <message>}`. Infrastructure failures
/// collapse to a generic message; their detail goes to the log stream only.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    retry_after: Option<Duration>,
}

impl ApiError {
    /// A 404 with the conventional body.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: "Not Found".to_string(),
            retry_after: None,
        }
    }

    /// The mapped status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let (status, retry_after) = match &err {
            AuthError::AccountExists => (StatusCode::CONFLICT, None),
            AuthError::InvalidEmail
            | AuthError::InvalidPassword
            | AuthError::EmailNotConfirmed
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenWrongClass { .. }
            | AuthError::RefreshTokenRevoked
            | AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, None),
            AuthError::InvalidConfirmationToken => (StatusCode::BAD_REQUEST, None),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, None),
            AuthError::RateLimited { retry_after } => {
                (StatusCode::TOO_MANY_REQUESTS, Some(*retry_after))
            }
            AuthError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AuthError::Store(_) | AuthError::Config(_) => {
                tracing::error!(error = %err, "request failed on infrastructure");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "Internal server error".to_string(),
                    retry_after: None,
                };
            }
        };

        Self {
            status,
            detail: err.to_string(),
            retry_after,
        }
    }
}

impl From<ContactError> for ApiError {
    fn from(err: ContactError) -> Self {
        tracing::error!(error = %err, "contact store failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Internal server error".to_string(),
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.detail }));
        match self.retry_after {
            Some(retry_after) => {
                let headers = [("Retry-After", retry_after.as_secs().max(1).to_string())];
                (self.status, headers, body).into_response()
            }
            None => (self.status, body).into_response(),
        }
    }
}

/// Client identity used for rate limiting: the peer IP when the listener
/// provides one, `"unknown"` otherwise.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());
        Ok(Self(ip))
    }
}

/// The raw bearer token from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::from(AuthError::Unauthenticated))?;

        let token = TokenService::extract_bearer(header)
            .ok_or_else(|| ApiError::from(AuthError::Unauthenticated))?;

        Ok(Self(token.to_string()))
    }
}

/// Extractor for authenticated requests.
///
/// Resolves the access token to a live account; any failure is the
/// `Unauthenticated` outcome, which handlers then refine with the role
/// authorizer where an operation demands more than a login.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The resolved account.
    pub account: Account,
}

impl RequireAuth {
    /// The caller's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.account.role
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let app = AppState::from_ref(state);

        let account = app.lifecycle.current_account(&token)?;
        Ok(Self { account })
    }
}

/// Coarse per-client request ceiling applied in front of every route.
pub struct ClientThrottle {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl ClientThrottle {
    /// Create a throttle admitting `requests_per_minute` per client.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Check whether a request from this client is admitted.
    #[must_use]
    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }
}

impl std::fmt::Debug for ClientThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientThrottle").finish_non_exhaustive()
    }
}

/// Middleware applying the [`ClientThrottle`] before routing.
pub async fn throttle(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    if state.throttle.check(&client) {
        next.run(request).await
    } else {
        ApiError::from(AuthError::RateLimited {
            retry_after: Duration::from_secs(60),
        })
        .into_response()
    }
}

//! Account lifecycle routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use cardfile_auth::{AccountProfile, Credentials, SignupRequest, TokenPair};

use crate::middleware::{ApiError, BearerToken, ClientIp};
use crate::server::AppState;

/// Routes under `/api/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh_token", post(refresh_token))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/confirmed_email/{token}", get(confirmed_email))
}

#[derive(Debug, Deserialize)]
struct SignupBody {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn signup(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Json(body): Json<SignupBody>,
) -> Result<(StatusCode, Json<AccountProfile>), ApiError> {
    let profile = state.lifecycle.signup(
        &client,
        SignupRequest {
            email: body.email,
            username: body.username,
            password: SecretString::from(body.password),
        },
    )?;

    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Json(body): Json<LoginBody>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.lifecycle.login(
        &client,
        Credentials {
            email: body.email,
            password: SecretString::from(body.password),
        },
    )?;

    Ok(Json(pair))
}

async fn refresh_token(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Json(body): Json<RefreshBody>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.lifecycle.refresh_session(&client, &body.refresh_token)?;
    Ok(Json(pair))
}

async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.logout(&token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn confirmed_email(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.lifecycle.confirm_email(&client, &token)?;
    Ok(Json(json!({ "message": "Email confirmed" })))
}

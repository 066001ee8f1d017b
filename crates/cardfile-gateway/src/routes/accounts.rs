//! Current-account routes.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, patch},
};
use serde::Deserialize;

use cardfile_auth::AccountProfile;

use crate::middleware::{ApiError, RequireAuth};
use crate::server::AppState;

/// Routes under `/api/users`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(me))
        .route("/api/users/avatar", patch(update_avatar))
}

#[derive(Debug, Deserialize)]
struct AvatarBody {
    url: String,
}

async fn me(auth: RequireAuth) -> Json<AccountProfile> {
    Json(auth.account.to_profile())
}

async fn update_avatar(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<AvatarBody>,
) -> Result<Json<AccountProfile>, ApiError> {
    let profile = state
        .lifecycle
        .update_avatar(&auth.account.email, body.url)?;
    Ok(Json(profile))
}

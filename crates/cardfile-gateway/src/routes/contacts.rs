//! Contact routes.
//!
//! Every handler runs the same sequence: rate gate, role authorizer, then
//! the store. The role requirements are registered in
//! `cardfile_contacts::policy`; the gate keys below identify the routes to
//! the shared counter.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;

use cardfile_auth::{AuthError, authorize};
use cardfile_contacts::{Contact, ContactDraft, SearchFilter, policy};
use cardfile_core::ContactId;

use crate::middleware::{ApiError, ClientIp, RequireAuth};
use crate::server::AppState;

/// Gate keys for the contact routes.
mod gate_keys {
    pub const READ: &str = "contacts.read";
    pub const CREATE: &str = "contacts.create";
    pub const UPDATE: &str = "contacts.update";
    pub const REMOVE: &str = "contacts.remove";
}

/// Default page size for listing.
const DEFAULT_LIMIT: usize = 10;
/// Hard ceiling on page size.
const MAX_LIMIT: usize = 500;

/// Routes under `/api/contacts`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/contacts", get(list).post(create))
        .route("/api/contacts/search", get(search))
        .route("/api/contacts/birthdays", get(birthdays))
        .route(
            "/api/contacts/{id}",
            get(get_one).put(update).delete(remove),
        )
}

fn consult_gate(state: &AppState, route: &str, client: &str) -> Result<(), ApiError> {
    state
        .gate
        .allow(
            route,
            client,
            state.limits.contact_requests,
            state.limits.contact_window(),
        )
        .map_err(|retry_after| ApiError::from(AuthError::RateLimited { retry_after }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    consult_gate(&state, gate_keys::READ, &client)?;
    authorize(&policy::READ, auth.role())?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let contacts = state.contacts.list(auth.account.id, limit, offset)?;
    Ok(Json(contacts))
}

async fn search(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    consult_gate(&state, gate_keys::READ, &client)?;
    authorize(&policy::READ, auth.role())?;

    let contacts = state.contacts.search(auth.account.id, &filter)?;
    Ok(Json(contacts))
}

async fn birthdays(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
) -> Result<Json<Vec<Contact>>, ApiError> {
    consult_gate(&state, gate_keys::READ, &client)?;
    authorize(&policy::READ, auth.role())?;

    let today = Utc::now().date_naive();
    let contacts = state.contacts.upcoming_birthdays(auth.account.id, today)?;
    Ok(Json(contacts))
}

async fn get_one(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Path(id): Path<u64>,
) -> Result<Json<Contact>, ApiError> {
    consult_gate(&state, gate_keys::READ, &client)?;
    authorize(&policy::READ, auth.role())?;

    state
        .contacts
        .get(auth.account.id, ContactId::new(id))?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn create(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Json(draft): Json<ContactDraft>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    consult_gate(&state, gate_keys::CREATE, &client)?;
    authorize(&policy::CREATE, auth.role())?;

    let contact = state.contacts.create(auth.account.id, draft)?;
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn update(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Path(id): Path<u64>,
    Json(draft): Json<ContactDraft>,
) -> Result<Json<Contact>, ApiError> {
    consult_gate(&state, gate_keys::UPDATE, &client)?;
    authorize(&policy::UPDATE, auth.role())?;

    state
        .contacts
        .update(auth.account.id, ContactId::new(id), draft)?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn remove(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    auth: RequireAuth,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    consult_gate(&state, gate_keys::REMOVE, &client)?;
    authorize(&policy::REMOVE, auth.role())?;

    state
        .contacts
        .remove(auth.account.id, ContactId::new(id))?
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(ApiError::not_found)
}

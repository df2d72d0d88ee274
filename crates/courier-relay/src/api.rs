//! HTTP control plane: registration and health.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::{
    config::RelayConfig,
    hub::HubHandle,
    registry::{ClaimOutcome, IdentityRegistry},
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IdentityRegistry>,
    pub hub: HubHandle,
    pub config: RelayConfig,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    id: String,
}

// POST /register {"id": "<string>"}
pub async fn post_register(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid body").into_response(),
    };
    if request.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "invalid body").into_response();
    }

    match state.registry.claim(&request.id) {
        ClaimOutcome::Created => {
            info!(id = %request.id, "identifier registered");
            (StatusCode::CREATED, "ok").into_response()
        }
        ClaimOutcome::Conflict => (StatusCode::CONFLICT, "id already taken").into_response(),
    }
}

// GET /health
pub async fn get_health() -> &'static str {
    "OK"
}

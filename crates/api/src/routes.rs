use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use acctdash_core::SnapshotError;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Account
        .route("/account", get(account_snapshot))
        .route("/account/raw", get(account_raw))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

fn config_error(err: SnapshotError) -> Response {
    tracing::warn!(error = %err, "Account request rejected");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// Normalized snapshot. Degraded sections come back empty with a 200.
async fn account_snapshot(State(state): State<Arc<AppState>>) -> Response {
    let result = acctdash_engine::load_snapshot(
        state.credentials.clone(),
        state.config.clone(),
        state.transport.clone(),
    )
    .await;

    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => config_error(e),
    }
}

/// The three exchange envelopes as received.
async fn account_raw(State(state): State<Arc<AppState>>) -> Response {
    let result = acctdash_engine::load_account_info(
        state.credentials.clone(),
        state.config.clone(),
        state.transport.clone(),
    )
    .await;

    match result {
        Ok(raw) => Json(raw).into_response(),
        Err(e) => config_error(e),
    }
}

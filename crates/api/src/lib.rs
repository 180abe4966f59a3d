pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum application router.
pub fn build_router(state: state::AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the API server.
pub async fn start_server(state: state::AppState, bind_addr: &str) -> anyhow::Result<()> {
    if let Err(e) = &state.credentials {
        tracing::warn!(
            error = %e,
            "Starting without exchange credentials; account routes will report the error"
        );
    }
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("API server listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

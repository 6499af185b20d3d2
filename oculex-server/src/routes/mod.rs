use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{any, get, post},
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{ingest, ws};
use crate::infra::app_state::AppState;

/// Assemble the full application router: liveness endpoints, the API
/// surface, CORS, and request tracing.
pub fn create_app(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state);

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(create_api_router())
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API routes: the ingest gateway and the session relay endpoint.
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/save_test_result", post(ingest::save_test_result))
            .route("/save_notes", post(ingest::save_notes))
            .route("/patients/{name}/history", get(ingest::patient_history))
            .route("/session/ws", any(ws::websocket_handler)),
    )
}

/// Permissive CORS in dev mode, explicit allow-list otherwise.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    if state.config.dev_mode {
        return CorsLayer::permissive();
    }

    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| axum::http::HeaderValue::from_str(origin).ok())
        .collect();
    let allow_origin = if origins.is_empty() || state.config.cors.is_wildcard_included() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new().allow_origin(allow_origin)
}

async fn ping_handler() -> Result<Json<Value>, StatusCode> {
    info!("ping endpoint called");
    Ok(Json(json!({
        "status": "ok",
        "message": "Oculex session server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let durable = state.store.is_durable();
    let health_status = json!({
        "status": if durable { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "store": {
                "status": if durable { "healthy" } else { "memory-only" },
                "sheet_count": state.store.sheet_count(),
                "workbook": state.store.path().map(|p| p.display().to_string()),
            },
            "relay": {
                "status": "healthy",
                "connections": state.relay.connection_count(),
            },
        }
    });

    Ok(Json(health_status))
}

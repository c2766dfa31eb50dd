use axum::{routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'static str>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
}

async fn health() -> Json<HealthResponse> {
    info!("GET /health - Health check");
    Json(HealthResponse {
        status: "ok",
        service: None,
    })
}

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServiceConfig;
use crate::routes::{forecast, health, imports};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .merge(health::router())
        .merge(forecast::router())
        .merge(imports::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins = match &config.cors_allowed_origins {
        None => return CorsLayer::permissive(),
        Some(origins) => origins,
    };

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{ForecastRequest, ForecastResponse, MAX_HORIZON_DAYS};
use crate::services::{forecasting_service, series_service};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<ForecastRequest>,
) -> Result<Json<ForecastResponse>, AppError> {
    info!(
        "POST /predict - {} points, {} days, method {:?}",
        request.series.len(),
        request.days,
        request.method
    );

    if request.days > MAX_HORIZON_DAYS {
        return Err(AppError::Validation(format!(
            "days must be at most {}, got {}",
            MAX_HORIZON_DAYS, request.days
        )));
    }

    let today = Utc::now().date_naive();

    // fitting is CPU bound, keep it off the async workers
    let config = state.forecast_config.clone();
    let worker_request = request.clone();
    let forecast = match tokio::task::spawn_blocking(move || {
        forecasting_service::generate_forecast(&worker_request, &config, today)
    })
    .await
    {
        Ok(result) => result?,
        Err(e) => {
            error!("Forecast worker failed: {}, using last observed value", e);
            let series = series_service::normalize(&request.series)?;
            forecasting_service::last_value_fallback(&series, request.horizon(), today)
        }
    };

    Ok(Json(forecast.into()))
}

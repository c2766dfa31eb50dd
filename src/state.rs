use std::sync::Arc;

use crate::config::ForecastConfig;

#[derive(Clone)]
pub struct AppState {
    pub forecast_config: Arc<ForecastConfig>,
}

impl AppState {
    pub fn new(forecast_config: ForecastConfig) -> Self {
        Self {
            forecast_config: Arc::new(forecast_config),
        }
    }
}

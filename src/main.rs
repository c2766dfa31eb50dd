use anyhow::Context;
use tokio::net::TcpListener;

use cashflow_forecast::app;
use cashflow_forecast::config::{ForecastConfig, ServiceConfig};
use cashflow_forecast::logging::{init_logging, LoggingConfig};
use cashflow_forecast::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let service_config = ServiceConfig::from_env()?;
    let forecast_config = ForecastConfig::from_env().context("Invalid forecast configuration")?;
    tracing::info!("📈 Forecast configuration: {:?}", forecast_config);

    let cors = app::cors_layer(&service_config);
    let router = app::create_app(AppState::new(forecast_config)).layer(cors);

    let addr = service_config.socket_addr()?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("🚀 Forecast service running at http://{}/", addr);

    axum::serve(listener, router).await?;

    Ok(())
}

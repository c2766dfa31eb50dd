use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Read an optional environment variable and parse it, keeping `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// `None` means any origin is allowed.
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        // PORT wins (hosting platforms set it), PY_PORT is the service-specific override
        let port = match std::env::var("PORT").or_else(|_| std::env::var("PY_PORT")) {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid port: {:?}", raw))?,
            Err(_) => 5000,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|raw| parse_origins(&raw))
            .filter(|origins| !origins.iter().any(|o| o == "*"));

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hyperparameters of the forecasting models. Loaded once at start-up and
/// only ever read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// Prior scale of the trend changepoint deltas; smaller values damp the trend.
    pub changepoint_prior_scale: f64,
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may be placed.
    pub changepoint_range: f64,
    pub weekly_fourier_order: usize,
    pub seasonality_prior_scale: f64,
    pub moving_average_window: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            n_changepoints: 25,
            changepoint_range: 0.8,
            weekly_fourier_order: 3,
            seasonality_prior_scale: 10.0,
            moving_average_window: 7,
        }
    }
}

impl ForecastConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            changepoint_prior_scale: env_or(
                "FORECAST_CHANGEPOINT_PRIOR_SCALE",
                defaults.changepoint_prior_scale,
            )?,
            n_changepoints: env_or("FORECAST_N_CHANGEPOINTS", defaults.n_changepoints)?,
            changepoint_range: env_or("FORECAST_CHANGEPOINT_RANGE", defaults.changepoint_range)?,
            weekly_fourier_order: env_or(
                "FORECAST_WEEKLY_FOURIER_ORDER",
                defaults.weekly_fourier_order,
            )?,
            seasonality_prior_scale: env_or(
                "FORECAST_SEASONALITY_PRIOR_SCALE",
                defaults.seasonality_prior_scale,
            )?,
            moving_average_window: env_or(
                "FORECAST_MOVING_AVERAGE_WINDOW",
                defaults.moving_average_window,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.changepoint_prior_scale > 0.0 && self.changepoint_prior_scale.is_finite()) {
            bail!(
                "changepoint_prior_scale must be positive, got {}",
                self.changepoint_prior_scale
            );
        }
        if !(self.seasonality_prior_scale > 0.0 && self.seasonality_prior_scale.is_finite()) {
            bail!(
                "seasonality_prior_scale must be positive, got {}",
                self.seasonality_prior_scale
            );
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            bail!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            );
        }
        if self.moving_average_window == 0 {
            bail!("moving_average_window must be at least 1");
        }
        Ok(())
    }
}

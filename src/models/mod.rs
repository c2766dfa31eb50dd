mod forecast;
mod transaction;

pub use forecast::{
    Forecast, ForecastMethod, ForecastRequest, ForecastResponse, ForecastSource, Point, RawPoint,
    Series, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS,
};
pub use transaction::{ParseResponse, Transaction};

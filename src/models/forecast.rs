use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Horizon used when a request does not say how many days to forecast.
pub const DEFAULT_HORIZON_DAYS: i64 = 14;

/// Longest horizon a request may ask for.
pub const MAX_HORIZON_DAYS: i64 = 3650;

fn default_days() -> i64 {
    DEFAULT_HORIZON_DAYS
}

/// One observed balance sample as received on the wire, date still unparsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPoint {
    pub date: String,
    pub value: f64,
}

/// One observed (or predicted) balance on a calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub date: NaiveDate,
    pub value: f64,
}

/// Balance samples in ascending date order.
///
/// Repeated dates are allowed and keep the order they arrived in. The only
/// way to build one from caller input is `series_service::normalize`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<Point>,
}

impl Series {
    pub(crate) fn from_sorted(points: Vec<Point>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].date <= w[1].date));
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    /// Most recent sample (the last one, for repeated final dates).
    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        Some(self.values().map(|v| v / n).sum())
    }
}

/// Forecasting methodology behind the trend model interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    #[default]
    SeasonalTrend,
    MovingAverage,
}

impl ForecastMethod {
    pub fn description(&self) -> &'static str {
        match self {
            ForecastMethod::SeasonalTrend => {
                "Piecewise-linear trend with weekly seasonality"
            }
            ForecastMethod::MovingAverage => {
                "Trailing moving average with jump clamping"
            }
        }
    }
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastRequest {
    pub series: Vec<RawPoint>,
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default)]
    pub method: ForecastMethod,
}

impl ForecastRequest {
    /// Number of future days to produce; non-positive requests yield nothing.
    pub fn horizon(&self) -> usize {
        self.days.clamp(0, MAX_HORIZON_DAYS) as usize
    }
}

/// Response of `POST /predict`. `dates` and `balances` always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub dates: Vec<NaiveDate>,
    pub balances: Vec<f64>,
}

/// Which branch of the engine produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastSource {
    ZeroFill,
    SingleValue,
    /// Fitted model, by name.
    Model(&'static str),
    MeanFallback,
    LastValueFallback,
}

/// Engine output before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub dates: Vec<NaiveDate>,
    pub balances: Vec<f64>,
    pub source: ForecastSource,
}

impl Forecast {
    /// The same value on each of `dates`.
    pub fn constant(dates: Vec<NaiveDate>, value: f64, source: ForecastSource) -> Self {
        let balances = vec![value; dates.len()];
        Self { dates, balances, source }
    }
}

impl From<Forecast> for ForecastResponse {
    fn from(forecast: Forecast) -> Self {
        ForecastResponse {
            dates: forecast.dates,
            balances: forecast.balances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(day: u32, value: f64) -> Point {
        Point {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            value,
        }
    }

    #[test]
    fn test_mean_of_huge_values_does_not_overflow() {
        let series = Series::from_sorted(vec![point(1, 1e308), point(9, 1e308)]);
        let mean = series.mean().unwrap();
        assert!(mean.is_finite());
        assert!((mean - 1e308).abs() / 1e308 < 1e-12);
    }

    #[test]
    fn test_mean_of_empty_series_is_none() {
        assert_eq!(Series::default().mean(), None);
    }

    #[test]
    fn test_horizon_is_clamped() {
        let mut request = ForecastRequest {
            series: Vec::new(),
            days: -5,
            method: ForecastMethod::default(),
        };
        assert_eq!(request.horizon(), 0);

        request.days = 1_000_000_000_000;
        assert_eq!(request.horizon(), MAX_HORIZON_DAYS as usize);
    }
}

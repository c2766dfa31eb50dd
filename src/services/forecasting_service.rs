use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::ForecastConfig;
use crate::errors::{PipelineFault, PredictError, SeriesError};
use crate::models::{
    Forecast, ForecastMethod, ForecastRequest, ForecastSource, Point, Series, MAX_HORIZON_DAYS,
};
use crate::services::horizon_service::{horizon_dates, HorizonAnchor};
use crate::services::series_service::{self, SeriesShape};
use crate::services::trend_model::{MovingAverageModel, SeasonalTrendModel, TrendModel};

/// Normalize the request and forecast it.
///
/// The only error is an unparseable date in the input series; every other
/// failure degrades to a fallback forecast of exactly `days` entries.
pub fn generate_forecast(
    request: &ForecastRequest,
    config: &ForecastConfig,
    today: NaiveDate,
) -> Result<Forecast, SeriesError> {
    let series = series_service::normalize(&request.series)?;
    Ok(forecast(&series, request.horizon(), request.method, config, today))
}

/// Forecast a normalized series with the model selected by `method`.
pub fn forecast(
    series: &Series,
    horizon: usize,
    method: ForecastMethod,
    config: &ForecastConfig,
    today: NaiveDate,
) -> Forecast {
    info!(
        "Forecasting {} days from {} points ({})",
        horizon,
        series.len(),
        method.description()
    );

    match method {
        ForecastMethod::SeasonalTrend => {
            forecast_series(&SeasonalTrendModel::from_config(config), series, horizon, today)
        }
        ForecastMethod::MovingAverage => {
            forecast_series(&MovingAverageModel::from_config(config), series, horizon, today)
        }
    }
}

/// Run the fallback policy around `model`, with a last-resort guard over the
/// whole pipeline. Always returns `horizon` dates and balances, with
/// `horizon` capped at [`MAX_HORIZON_DAYS`].
pub fn forecast_series<M: TrendModel>(
    model: &M,
    series: &Series,
    horizon: usize,
    today: NaiveDate,
) -> Forecast {
    let horizon = horizon.min(MAX_HORIZON_DAYS as usize);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(model, series, horizon, today)))
        .unwrap_or_else(|payload| Err(PipelineFault::Panicked(panic_message(payload))));

    match outcome {
        Ok(forecast) => {
            info!("Forecast produced by {:?}", forecast.source);
            forecast
        }
        Err(fault) => {
            warn!("Forecast pipeline fault: {}, using last observed value", fault);
            last_value_fallback(series, horizon, today)
        }
    }
}

fn run_pipeline<M: TrendModel>(
    model: &M,
    series: &Series,
    horizon: usize,
    today: NaiveDate,
) -> Result<Forecast, PipelineFault> {
    let fallback_dates = || horizon_dates(HorizonAnchor::Today(today), horizon);

    let history = match series_service::classify(series) {
        SeriesShape::Empty => {
            return Ok(Forecast::constant(fallback_dates(), 0.0, ForecastSource::ZeroFill));
        }
        SeriesShape::Single(value) => {
            return Ok(Forecast::constant(fallback_dates(), value, ForecastSource::SingleValue));
        }
        SeriesShape::Fittable(history) => history,
    };

    let fitted = match model.fit(history) {
        Ok(fitted) => fitted,
        Err(e) => {
            warn!("{} fit error: {}, using mean fallback", model.name(), e);
            let mean = history
                .mean()
                .filter(|m| m.is_finite())
                .or_else(|| history.last().map(|p| p.value))
                .unwrap_or(0.0);
            return Ok(Forecast::constant(fallback_dates(), mean, ForecastSource::MeanFallback));
        }
    };

    let window = model.predict(&fitted, horizon)?;
    let future = extract_tail(window, horizon)?;

    let (dates, balances) = future.into_iter().map(|p| (p.date, p.value)).unzip();
    Ok(Forecast {
        dates,
        balances,
        source: ForecastSource::Model(model.name()),
    })
}

/// Keep the last `horizon` entries of a prediction window; the rest are
/// in-sample fits for history dates.
fn extract_tail(mut window: Vec<Point>, horizon: usize) -> Result<Vec<Point>, PredictError> {
    if window.len() < horizon {
        return Err(PredictError::WindowTooShort {
            expected: horizon,
            got: window.len(),
        });
    }
    Ok(window.split_off(window.len() - horizon))
}

/// Most recent observed value (0.0 for no history) on each of the next `horizon` days.
///
/// Cannot fail: the horizon is capped and dates stop at the end of the calendar.
pub fn last_value_fallback(series: &Series, horizon: usize, today: NaiveDate) -> Forecast {
    let value = series
        .last()
        .map(|p| p.value)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    Forecast::constant(
        horizon_dates(
            HorizonAnchor::Today(today),
            horizon.min(MAX_HORIZON_DAYS as usize),
        ),
        value,
        ForecastSource::LastValueFallback,
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FitError;
    use crate::models::RawPoint;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 1)
    }

    fn request(points: &[(&str, f64)], days: i64) -> ForecastRequest {
        ForecastRequest {
            series: points
                .iter()
                .map(|(d, v)| RawPoint {
                    date: d.to_string(),
                    value: *v,
                })
                .collect(),
            days,
            method: ForecastMethod::SeasonalTrend,
        }
    }

    fn series(points: &[(&str, f64)]) -> Series {
        series_service::normalize(&request(points, 0).series).unwrap()
    }

    /// Fits fine, then misbehaves in predict.
    enum BrokenModel {
        Panics,
        ShortWindow,
        NonFinite,
    }

    impl TrendModel for BrokenModel {
        type Fitted = ();

        fn name(&self) -> &'static str {
            "broken"
        }

        fn fit(&self, _series: &Series) -> Result<(), FitError> {
            Ok(())
        }

        fn predict(&self, _fitted: &(), horizon: usize) -> Result<Vec<Point>, PredictError> {
            match self {
                BrokenModel::Panics => panic!("division by zero in predict"),
                BrokenModel::ShortWindow => Ok(vec![
                    Point {
                        date: date(2024, 1, 1),
                        value: 1.0,
                    };
                    horizon.saturating_sub(1)
                ]),
                BrokenModel::NonFinite => Err(PredictError::NonFinite {
                    date: date(2024, 1, 1),
                }),
            }
        }
    }

    struct FailingFit;

    impl TrendModel for FailingFit {
        type Fitted = ();

        fn name(&self) -> &'static str {
            "failing_fit"
        }

        fn fit(&self, _series: &Series) -> Result<(), FitError> {
            Err(FitError::NotPositiveDefinite)
        }

        fn predict(&self, _fitted: &(), _horizon: usize) -> Result<Vec<Point>, PredictError> {
            unreachable!("predict is never called after a failed fit")
        }
    }

    #[test]
    fn test_empty_series_is_zero_filled_from_today() {
        let forecast =
            generate_forecast(&request(&[], 3), &ForecastConfig::default(), today()).unwrap();

        assert_eq!(forecast.source, ForecastSource::ZeroFill);
        assert_eq!(forecast.balances, vec![0.0, 0.0, 0.0]);
        assert_eq!(
            forecast.dates,
            vec![date(2024, 6, 2), date(2024, 6, 3), date(2024, 6, 4)]
        );
    }

    #[test]
    fn test_single_point_is_repeated() {
        let forecast = generate_forecast(
            &request(&[("2024-01-01", 100.0)], 5),
            &ForecastConfig::default(),
            today(),
        )
        .unwrap();

        assert_eq!(forecast.source, ForecastSource::SingleValue);
        assert_eq!(forecast.balances, vec![100.0; 5]);
        assert_eq!(forecast.dates[0], date(2024, 6, 2));
    }

    #[test]
    fn test_constant_series_falls_back_to_mean() {
        let forecast = generate_forecast(
            &request(
                &[("2024-01-01", 50.0), ("2024-01-08", 50.0), ("2024-01-15", 50.0)],
                7,
            ),
            &ForecastConfig::default(),
            today(),
        )
        .unwrap();

        assert_eq!(forecast.source, ForecastSource::MeanFallback);
        assert_eq!(forecast.balances.len(), 7);
        assert!(forecast.balances.iter().all(|b| (b - 50.0).abs() < 1e-9));
    }

    #[test]
    fn test_fit_failure_uses_mean_of_all_values() {
        let history = series(&[("2024-01-03", 30.0), ("2024-01-01", 10.0), ("2024-01-02", 20.0)]);
        let forecast = forecast_series(&FailingFit, &history, 4, today());

        assert_eq!(forecast.source, ForecastSource::MeanFallback);
        assert_eq!(forecast.balances, vec![20.0; 4]);
        assert_eq!(forecast.dates[0], date(2024, 6, 2));
    }

    #[test]
    fn test_successful_fit_is_anchored_on_last_observed_date() {
        let start = date(2024, 1, 1);
        let points: Vec<(String, f64)> = (0..28)
            .map(|i| ((start + Duration::days(i)).to_string(), 500.0 + 5.0 * i as f64))
            .collect();
        let borrowed: Vec<(&str, f64)> = points.iter().map(|(d, v)| (d.as_str(), *v)).collect();

        let forecast =
            generate_forecast(&request(&borrowed, 10), &ForecastConfig::default(), today()).unwrap();

        assert_eq!(forecast.source, ForecastSource::Model("seasonal_trend"));
        assert_eq!(forecast.dates.len(), 10);
        assert_eq!(forecast.balances.len(), 10);
        assert_eq!(forecast.dates[0], date(2024, 1, 29));
        assert!(forecast.balances[0] >= 500.0 + 5.0 * 27.0 - 1.0);
    }

    #[test]
    fn test_moving_average_method_is_selectable() {
        let mut req = request(&[("2024-01-01", 10.0), ("2024-01-02", 20.0)], 2);
        req.method = ForecastMethod::MovingAverage;

        let forecast = generate_forecast(&req, &ForecastConfig::default(), today()).unwrap();
        assert_eq!(forecast.source, ForecastSource::Model("moving_average"));
        assert_eq!(forecast.balances[0], 15.0);
        assert_eq!(forecast.dates[0], date(2024, 1, 3));
    }

    #[test]
    fn test_panicking_predict_uses_last_value() {
        let history = series(&[("2024-01-02", 7.0), ("2024-01-01", 3.0)]);
        let forecast = forecast_series(&BrokenModel::Panics, &history, 3, today());

        assert_eq!(forecast.source, ForecastSource::LastValueFallback);
        assert_eq!(forecast.balances, vec![7.0; 3]);
        assert_eq!(forecast.dates.len(), 3);
    }

    #[test]
    fn test_short_window_uses_last_value() {
        let history = series(&[("2024-01-01", 3.0), ("2024-01-02", 9.0)]);
        let forecast = forecast_series(&BrokenModel::ShortWindow, &history, 5, today());

        assert_eq!(forecast.source, ForecastSource::LastValueFallback);
        assert_eq!(forecast.balances, vec![9.0; 5]);
    }

    #[test]
    fn test_predict_error_uses_last_value() {
        let history = series(&[("2024-01-01", 3.0), ("2024-01-02", 4.0)]);
        let forecast = forecast_series(&BrokenModel::NonFinite, &history, 2, today());

        assert_eq!(forecast.source, ForecastSource::LastValueFallback);
        assert_eq!(forecast.balances, vec![4.0, 4.0]);
    }

    #[test]
    fn test_non_positive_days_yield_empty_output() {
        for days in [0, -3] {
            let forecast = generate_forecast(
                &request(&[("2024-01-01", 1.0), ("2024-01-05", 2.0)], days),
                &ForecastConfig::default(),
                today(),
            )
            .unwrap();
            assert!(forecast.dates.is_empty());
            assert!(forecast.balances.is_empty());
        }
    }

    #[test]
    fn test_bad_date_is_the_only_error() {
        let err = generate_forecast(
            &request(&[("2024-01-01", 1.0), ("01/02/2024", 2.0)], 3),
            &ForecastConfig::default(),
            today(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            SeriesError::InvalidDate {
                index: 1,
                value: "01/02/2024".to_string()
            }
        );
    }

    #[test]
    fn test_lengths_always_match_horizon() {
        let inputs: Vec<Vec<(&str, f64)>> = vec![
            vec![],
            vec![("2024-01-01", 5.0)],
            vec![("2024-01-01", 5.0), ("2024-01-01", 6.0)],
            vec![("2024-01-01", 5.0), ("2024-03-01", -6.0), ("2024-02-01", 1e9)],
        ];

        for points in &inputs {
            for method in [ForecastMethod::SeasonalTrend, ForecastMethod::MovingAverage] {
                let mut req = request(points, 9);
                req.method = method;
                let forecast = generate_forecast(&req, &ForecastConfig::default(), today()).unwrap();
                assert_eq!(forecast.dates.len(), 9);
                assert_eq!(forecast.balances.len(), 9);
            }
        }
    }

    #[test]
    fn test_huge_finite_values_never_yield_non_finite_balances() {
        for method in [ForecastMethod::SeasonalTrend, ForecastMethod::MovingAverage] {
            let mut req = request(&[("2024-01-01", 1e308), ("2024-01-09", 1e308)], 3);
            req.method = method;

            let forecast = generate_forecast(&req, &ForecastConfig::default(), today()).unwrap();
            assert_eq!(forecast.balances.len(), 3);
            assert!(forecast.balances.iter().all(|b| b.is_finite()));
        }
    }

    #[test]
    fn test_history_at_calendar_end_falls_back_from_today() {
        let end = NaiveDate::MAX - chrono::Days::new(1);
        let history = Series::from_sorted(vec![
            Point {
                date: end - chrono::Days::new(2),
                value: 4.0,
            },
            Point {
                date: end,
                value: 8.0,
            },
        ]);

        let forecast = forecast(
            &history,
            6,
            ForecastMethod::SeasonalTrend,
            &ForecastConfig::default(),
            today(),
        );

        assert_eq!(forecast.source, ForecastSource::LastValueFallback);
        assert_eq!(forecast.balances, vec![8.0; 6]);
        assert_eq!(forecast.dates[0], date(2024, 6, 2));
    }

    #[test]
    fn test_horizon_is_capped() {
        let history = series(&[("2024-01-01", 3.0), ("2024-01-02", 4.0)]);
        let forecast = forecast_series(&BrokenModel::NonFinite, &history, usize::MAX, today());

        assert_eq!(forecast.dates.len(), MAX_HORIZON_DAYS as usize);
        assert_eq!(forecast.balances.len(), MAX_HORIZON_DAYS as usize);
    }

    #[test]
    fn test_last_value_fallback_survives_calendar_end() {
        let history = series(&[("2024-01-01", 3.0), ("2024-01-02", 4.0)]);
        let forecast = last_value_fallback(&history, 10, NaiveDate::MAX - chrono::Days::new(1));

        assert_eq!(forecast.dates, vec![NaiveDate::MAX]);
        assert_eq!(forecast.balances, vec![4.0]);
    }

    #[test]
    fn test_extract_tail_drops_in_sample_entries() {
        let window: Vec<Point> = (1..=5)
            .map(|d| Point {
                date: date(2024, 1, d),
                value: d as f64,
            })
            .collect();

        let tail = extract_tail(window, 2).unwrap();
        assert_eq!(tail.iter().map(|p| p.value).collect::<Vec<_>>(), vec![4.0, 5.0]);
    }
}

//! Trend models behind a minimal fit/predict interface.
//!
//! The forecasting service only ever talks to [`TrendModel`], so the seasonal
//! regression can be swapped for any other method without touching the
//! fallback policy.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};

use crate::config::ForecastConfig;
use crate::errors::{FitError, PredictError};
use crate::models::{Point, Series};
use crate::services::horizon_service::{horizon_dates, HorizonAnchor};

const WEEKLY_PERIOD_DAYS: f64 = 7.0;

/// Prior scale of the base growth rate and offset.
const TREND_PRIOR_SCALE: f64 = 5.0;

/// Assumed observation noise variance on the max-abs scaled values. Turns the
/// Gaussian priors into ridge penalties.
const OBSERVATION_NOISE_VARIANCE: f64 = 0.01;

pub trait TrendModel {
    type Fitted;

    fn name(&self) -> &'static str;

    fn fit(&self, series: &Series) -> Result<Self::Fitted, FitError>;

    /// Predictions for the history dates followed by `horizon` days after the
    /// last observed date, in date order.
    fn predict(&self, fitted: &Self::Fitted, horizon: usize) -> Result<Vec<Point>, PredictError>;
}

// ============================================================================
// SEASONAL TREND
// ============================================================================

/// Piecewise-linear trend plus a weekly Fourier seasonality, fitted as a MAP
/// estimate under Gaussian priors. Daily and yearly seasonality are never used.
#[derive(Debug, Clone)]
pub struct SeasonalTrendModel {
    changepoint_prior_scale: f64,
    n_changepoints: usize,
    changepoint_range: f64,
    weekly_fourier_order: usize,
    seasonality_prior_scale: f64,
}

impl SeasonalTrendModel {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            changepoint_prior_scale: config.changepoint_prior_scale,
            n_changepoints: config.n_changepoints,
            changepoint_range: config.changepoint_range,
            weekly_fourier_order: config.weekly_fourier_order,
            seasonality_prior_scale: config.seasonality_prior_scale,
        }
    }
}

impl Default for SeasonalTrendModel {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct SeasonalTrendFit {
    start: NaiveDate,
    last: NaiveDate,
    history_dates: Vec<NaiveDate>,
    /// History span in days; maps day offsets onto [0, 1].
    t_scale: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    fourier_order: usize,
    coefficients: Array1<f64>,
}

impl SeasonalTrendFit {
    pub fn fourier_order(&self) -> usize {
        self.fourier_order
    }

    pub fn changepoint_count(&self) -> usize {
        self.changepoints.len()
    }

    fn features(&self, date: NaiveDate) -> Vec<f64> {
        let days = (date - self.start).num_days() as f64;
        feature_row(days, days / self.t_scale, &self.changepoints, self.fourier_order)
    }
}

/// `[1, t, (t - s_j)+ ..., sin/cos(2πkd/7) ...]`
fn feature_row(days: f64, t: f64, changepoints: &[f64], fourier_order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len() + 2 * fourier_order);
    row.push(1.0);
    row.push(t);
    row.extend(changepoints.iter().map(|&s| (t - s).max(0.0)));
    for k in 1..=fourier_order {
        let angle = 2.0 * PI * k as f64 * days / WEEKLY_PERIOD_DAYS;
        row.push(angle.sin());
        row.push(angle.cos());
    }
    row
}

/// Indices of changepoint candidates, evenly spread over the first
/// `range` share of the observations. Index 0 is never a changepoint.
fn changepoint_indices(n: usize, max_changepoints: usize, range: f64) -> Vec<usize> {
    let hist_size = (n as f64 * range).floor() as usize;
    let count = max_changepoints.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let step = (hist_size - 1) as f64 / count as f64;
    (1..=count)
        .map(|i| (i as f64 * step).round() as usize)
        .collect()
}

/// The `horizon` days after `last`, or an error when they run off the calendar.
fn future_dates(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>, PredictError> {
    let dates = horizon_dates(HorizonAnchor::LastObserved(last), horizon);
    if dates.len() < horizon {
        return Err(PredictError::DateOutOfRange { last });
    }
    Ok(dates)
}

/// Solve `a · x = b` for symmetric positive-definite `a` via Cholesky.
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(sum > 0.0 && sum.is_finite()) {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Some(x)
}

impl TrendModel for SeasonalTrendModel {
    type Fitted = SeasonalTrendFit;

    fn name(&self) -> &'static str {
        "seasonal_trend"
    }

    fn fit(&self, series: &Series) -> Result<SeasonalTrendFit, FitError> {
        let points = series.points();
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) if points.len() >= 2 => (first, last),
            _ => {
                return Err(FitError::TooFewPoints {
                    needed: 2,
                    got: points.len(),
                })
            }
        };

        let span_days = (last.date - first.date).num_days();
        if span_days <= 0 {
            return Err(FitError::DegenerateTimeSpan);
        }

        let mean = series.mean().unwrap_or(0.0);
        let spread = series.values().map(|v| (v - mean).abs()).fold(0.0, f64::max);
        if spread <= 1e-12 * mean.abs().max(1.0) {
            return Err(FitError::ZeroVariance);
        }

        let y_scale = series.values().map(f64::abs).fold(0.0, f64::max);
        let t_scale = span_days as f64;
        let start = first.date;
        let t_of = |date: NaiveDate| (date - start).num_days() as f64 / t_scale;

        let changepoints: Vec<f64> =
            changepoint_indices(points.len(), self.n_changepoints, self.changepoint_range)
                .into_iter()
                .map(|i| t_of(points[i].date))
                .collect();

        // Each harmonic needs two more distinct weekdays to be identifiable
        let weekdays: BTreeSet<u32> = points
            .iter()
            .map(|p| p.date.weekday().num_days_from_monday())
            .collect();
        let fourier_order = self
            .weekly_fourier_order
            .min(weekdays.len().saturating_sub(1) / 2);

        let n_params = 2 + changepoints.len() + 2 * fourier_order;
        let mut design = Array2::<f64>::zeros((points.len(), n_params));
        let mut target = Array1::<f64>::zeros(points.len());

        for (i, p) in points.iter().enumerate() {
            let days = (p.date - start).num_days() as f64;
            let row = feature_row(days, days / t_scale, &changepoints, fourier_order);
            for (j, v) in row.into_iter().enumerate() {
                design[[i, j]] = v;
            }
            target[i] = p.value / y_scale;
        }

        let mut normal = design.t().dot(&design);
        let rhs = design.t().dot(&target);

        let trend_penalty = OBSERVATION_NOISE_VARIANCE / TREND_PRIOR_SCALE.powi(2);
        let delta_penalty = OBSERVATION_NOISE_VARIANCE / self.changepoint_prior_scale.powi(2);
        let season_penalty = OBSERVATION_NOISE_VARIANCE / self.seasonality_prior_scale.powi(2);

        for j in 0..n_params {
            normal[[j, j]] += if j < 2 {
                trend_penalty
            } else if j < 2 + changepoints.len() {
                delta_penalty
            } else {
                season_penalty
            };
        }

        let coefficients = solve_spd(&normal, &rhs).ok_or(FitError::NotPositiveDefinite)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFinite);
        }

        let mut history_dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        history_dates.dedup();

        Ok(SeasonalTrendFit {
            start,
            last: last.date,
            history_dates,
            t_scale,
            y_scale,
            changepoints,
            fourier_order,
            coefficients,
        })
    }

    fn predict(&self, fitted: &SeasonalTrendFit, horizon: usize) -> Result<Vec<Point>, PredictError> {
        let future = future_dates(fitted.last, horizon)?;

        fitted
            .history_dates
            .iter()
            .chain(future.iter())
            .map(|&date| {
                let row = Array1::from(fitted.features(date));
                let value = row.dot(&fitted.coefficients) * fitted.y_scale;
                if value.is_finite() {
                    Ok(Point { date, value })
                } else {
                    Err(PredictError::NonFinite { date })
                }
            })
            .collect()
    }
}

// ============================================================================
// MOVING AVERAGE
// ============================================================================

/// Trailing moving average that feeds its own forecasts back into the window
/// and clamps large day-over-day jumps.
#[derive(Debug, Clone)]
pub struct MovingAverageModel {
    window: usize,
}

impl MovingAverageModel {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.moving_average_window)
    }
}

#[derive(Debug, Clone)]
pub struct MovingAverageFit {
    history: Vec<Point>,
}

fn round_cents(value: f64) -> f64 {
    let cents = value * 100.0;
    // past ~1e306 there are no cents left to round
    if cents.is_finite() {
        cents.round() / 100.0
    } else {
        value
    }
}

fn trailing_mean(values: &[f64], window: usize) -> f64 {
    let recent = &values[values.len().saturating_sub(window)..];
    if recent.is_empty() {
        return 0.0;
    }
    let n = recent.len() as f64;
    recent.iter().map(|v| v / n).sum()
}

impl TrendModel for MovingAverageModel {
    type Fitted = MovingAverageFit;

    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn fit(&self, series: &Series) -> Result<MovingAverageFit, FitError> {
        if series.is_empty() {
            return Err(FitError::TooFewPoints { needed: 1, got: 0 });
        }
        Ok(MovingAverageFit {
            history: series.points().to_vec(),
        })
    }

    fn predict(&self, fitted: &MovingAverageFit, horizon: usize) -> Result<Vec<Point>, PredictError> {
        let last = match fitted.history.last() {
            Some(p) => p.date,
            None => {
                return Err(PredictError::WindowTooShort {
                    expected: horizon,
                    got: 0,
                })
            }
        };

        let mut values: Vec<f64> = fitted.history.iter().map(|p| p.value).collect();
        let mut window_points: Vec<Point> = fitted
            .history
            .iter()
            .enumerate()
            .map(|(i, p)| Point {
                date: p.date,
                value: trailing_mean(&values[..=i], self.window),
            })
            .collect();

        let mut previous: Option<f64> = None;
        for date in future_dates(last, horizon)? {
            let avg = trailing_mean(&values, self.window);
            let mut value = round_cents(avg);

            if let Some(prev) = previous {
                let jump = value - prev;
                let threshold = (prev.abs() * 0.6).max(50.0);
                if jump.abs() > threshold {
                    value = round_cents(prev + jump.signum() * threshold);
                }
            }

            if !value.is_finite() {
                return Err(PredictError::NonFinite { date });
            }

            // the unclamped average keeps feeding the window
            values.push(avg);
            previous = Some(value);
            window_points.push(Point { date, value });
        }

        Ok(window_points)
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// The one caller-visible failure of the forecasting engine.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("Invalid date {value:?} at series[{index}]")]
    InvalidDate { index: usize, value: String },
}

/// Why a trend model could not be fitted. Always absorbed by the mean fallback.
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("need at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("all observations fall on a single date")]
    DegenerateTimeSpan,
    #[error("observed values have zero variance")]
    ZeroVariance,
    #[error("normal equations are not positive definite")]
    NotPositiveDefinite,
    #[error("fitted coefficients are not finite")]
    NonFinite,
}

/// A fitted model that cannot produce a usable prediction window.
#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("prediction produced a non-finite value at {date}")]
    NonFinite { date: chrono::NaiveDate },
    #[error("prediction window has {got} entries, expected at least {expected}")]
    WindowTooShort { expected: usize, got: usize },
    #[error("forecast horizon runs past the last representable date after {last}")]
    DateOutOfRange { last: chrono::NaiveDate },
}

/// Anything that escaped the per-stage fallbacks. Answered with the last-value forecast.
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error("predict failed: {0}")]
    Predict(#[from] PredictError),
    #[error("forecast pipeline panicked: {0}")]
    Panicked(String),
}

/// Spreadsheet structural problems. These fail the whole `/parse` request.
#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("File must be .xlsx, .xls or .csv format")]
    UnsupportedFileType,
    #[error("Cannot read spreadsheet: {0}")]
    Unreadable(String),
    #[error("Spreadsheet has no header row")]
    EmptySheet,
    #[error("Spreadsheet must contain 'date' and 'amount' columns (missing: {})", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::Series(e) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
            }
            AppError::Import(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response(),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

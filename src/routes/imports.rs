use axum::extract::{DefaultBodyLimit, Multipart};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::ParseResponse;
use crate::routes::health::HealthResponse;
use crate::services::spreadsheet_import_service;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/parse", post(parse_upload))
        .route("/parse/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

async fn health() -> Json<HealthResponse> {
    info!("GET /parse/health - Health check");
    Json(HealthResponse {
        status: "ok",
        service: Some("excel_parser"),
    })
}

struct Upload {
    filename: String,
    content: Vec<u8>,
    user_id: String,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id = "anon".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?;
                file = Some((filename, content.to_vec()));
            }
            Some("userId") => {
                user_id = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid userId: {}", e)))?;
            }
            _ => {}
        }
    }

    let (filename, content) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;

    Ok(Upload {
        filename,
        content,
        user_id,
    })
}

pub async fn parse_upload(multipart: Multipart) -> Result<Json<ParseResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    info!(
        "POST /parse - {} ({} bytes) for user {}",
        upload.filename,
        upload.content.len(),
        upload.user_id
    );

    let filename = upload.filename.clone();
    let transactions = tokio::task::spawn_blocking(move || {
        spreadsheet_import_service::parse_transactions(&upload.filename, &upload.content)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map_err(|e| {
        error!("Failed to parse {}: {}", filename, e);
        AppError::Import(e)
    })?;

    info!("Parsed {} transactions from {}", transactions.len(), filename);
    Ok(Json(ParseResponse::new(transactions)))
}

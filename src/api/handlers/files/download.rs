use crate::api::error::AppError;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::types::FileRecordResponse;

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid file id: {}", raw)))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
pub(crate) fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[utoipa::path(
    get,
    path = "/file/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File metadata", body = FileRecordResponse),
        (status = 400, description = "Malformed file id"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<crate::AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecordResponse>, AppError> {
    let id = parse_id(&file_id)?;
    let record = state.file_service.get_metadata(id).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/file/{id}/download",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content stream"),
        (status = 400, description = "Malformed file id"),
        (status = 404, description = "File or its local content not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&file_id)?;
    let content = state.file_service.get_content(id).await?;

    tracing::info!(
        "📎 Streaming {} ({} bytes)",
        content.record.storage_key(),
        content.len
    );

    let disposition = content_disposition(&content.record.display_filename());
    let stream = ReaderStream::new(content.file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content.record.format)
        .header(header::CONTENT_LENGTH, content.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

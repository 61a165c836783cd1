use crate::api::error::AppError;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::types::{FileRecordResponse, UploadFileForm};

fn payload_too_large() -> AppError {
    AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large()
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// True when a read error on the file stream was the body limit tripping
fn exceeded_body_limit(err: &std::io::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));

    while let Some(e) = source {
        if let Some(multipart) = e.downcast_ref::<MultipartError>() {
            return multipart.status() == StatusCode::PAYLOAD_TOO_LARGE;
        }
        source = e.source();
    }
    false
}

#[utoipa::path(
    post,
    path = "/upload_file",
    request_body(content = UploadFileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored locally and queued for replication", body = FileRecordResponse),
        (status = 400, description = "No file field in the form"),
        (status = 413, description = "Request body too large")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileRecordResponse>, AppError> {
    let mut declared_size: Option<i64> = None;
    let mut record = None;

    let result: Result<Json<FileRecordResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                if record.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one file per request is accepted".to_string(),
                    ));
                }

                let filename = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field.content_type().map(|s| s.to_string());

                let body_with_io_error = field.map_err(std::io::Error::other);
                let reader = StreamReader::new(body_with_io_error);

                let stored = state
                    .file_service
                    .ingest(&filename, content_type.as_deref(), declared_size, reader)
                    .await
                    .map_err(|e| match e {
                        AppError::LocalWrite { ref source, .. } if exceeded_body_limit(source) => {
                            payload_too_large()
                        }
                        other => other,
                    })?;
                record = Some(stored);
            } else if name == "size" {
                let text = field.text().await.map_err(multipart_error)?;
                declared_size = text.trim().parse().ok().filter(|s: &i64| *s >= 0);
            }
        }

        let record = record
            .take()
            .ok_or(AppError::BadRequest("No file provided".to_string()))?;

        Ok(Json(FileRecordResponse::from(record)))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees the error instead of a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

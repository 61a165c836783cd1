use crate::api::error::AppError;
use crate::entities::{file_records, prelude::*};
use sea_orm::EntityTrait;
use uuid::Uuid;

use super::{FileService, types::FileContent};

impl FileService {
    pub async fn get_metadata(&self, id: Uuid) -> Result<file_records::Model, AppError> {
        FileRecords::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    /// Open the locally cached bytes. There is no fallback to the object store:
    /// a swept local file is reported as not found.
    pub async fn get_content(&self, id: Uuid) -> Result<FileContent, AppError> {
        let record = self.get_metadata(id).await?;
        let key = record.storage_key();

        let file = match self.cache.open(&key).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Local file {} missing for existing record", key);
                return Err(AppError::NotFound(format!("Content for file {} not found", id)));
            }
            Err(e) => return Err(AppError::Internal(format!("Failed to open {}: {}", key, e))),
        };

        let len = file
            .metadata()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stat {}: {}", key, e)))?
            .len();

        Ok(FileContent { record, file, len })
    }
}

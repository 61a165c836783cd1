use crate::entities::file_records;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileRecordResponse {
    pub id: Uuid,
    pub name: String,
    pub format: String,
    pub extension: String,
    pub size: i64,
}

impl From<file_records::Model> for FileRecordResponse {
    fn from(model: file_records::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            format: model.format,
            extension: model.extension,
            size: model.size,
        }
    }
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadFileForm {
    /// Declared size in bytes. Only honoured when sent before `file`.
    pub size: Option<i64>,
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

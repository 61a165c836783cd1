use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One ingested file. The local file and the remote object are both named `{id}{extension}`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub format: String,
    #[sea_orm(column_type = "Text")]
    pub extension: String,
    pub size: i64,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn storage_key(&self) -> String {
        format!("{}{}", self.id, self.extension)
    }

    /// Name offered to clients on download
    pub fn display_filename(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use crate::api::error::AppError;
use crate::entities::file_records;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use tokio::io::AsyncRead;
use uuid::Uuid;

use super::FileService;

/// Split a client filename into base name and extension (including the dot).
///
/// Directory components are dropped first. A name made only of leading dots
/// before the last dot (`.bashrc`) has no extension.
pub fn split_filename(filename: &str) -> (String, String) {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);

    match base.rfind('.') {
        Some(idx) if !base[..idx].trim_start_matches('.').is_empty() => {
            (base[..idx].to_string(), base[idx..].to_string())
        }
        _ => (base.to_string(), String::new()),
    }
}

impl FileService {
    /// Record the file, write it to the local cache and queue it for replication.
    ///
    /// The row is committed before any byte is written. When no size is declared
    /// the row's size is filled in with the bytes written, its only update.
    /// Replication happens later and its failure does not affect the result.
    pub async fn ingest<R>(
        &self,
        filename: &str,
        content_type: Option<&str>,
        declared_size: Option<i64>,
        reader: R,
    ) -> Result<file_records::Model, AppError>
    where
        R: AsyncRead + Unpin,
    {
        let (name, extension) = split_filename(filename);
        let format = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM.essence_str())
            .to_string();

        let record = file_records::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            format: Set(format),
            extension: Set(extension),
            size: Set(declared_size.unwrap_or(0)),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        let key = record.storage_key();
        tracing::info!("📥 Ingesting {} as {}", filename, key);

        let written = self
            .cache
            .write_stream(&key, reader)
            .await
            .map_err(|source| AppError::LocalWrite {
                key: key.clone(),
                source,
            })?;

        // The local file is complete; it is replicated even if the size update below fails
        self.replication.enqueue(&key).await;

        let record = match declared_size {
            Some(declared) => {
                if declared != written as i64 {
                    tracing::warn!(
                        "Declared size {} for {} does not match {} bytes written",
                        declared,
                        key,
                        written
                    );
                }
                record
            }
            None => {
                let mut active: file_records::ActiveModel = record.into();
                active.size = Set(written as i64);
                active.update(&self.db).await?
            }
        };

        Ok(record)
    }
}

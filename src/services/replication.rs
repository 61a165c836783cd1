use crate::services::local_cache::LocalCache;
use crate::services::storage::{CompletedPartInfo, StorageService};
use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

/// State of one in-progress multipart upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<CompletedPartInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    Completed { parts: usize },
    Failed { reason: String },
}

/// Copies locally cached files to the object store as multipart uploads.
pub struct MultipartUploader {
    storage: Arc<dyn StorageService>,
    cache: LocalCache,
    chunk_size: usize,
}

impl MultipartUploader {
    pub fn new(storage: Arc<dyn StorageService>, cache: LocalCache, chunk_size: usize) -> Self {
        Self {
            storage,
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create the bucket unless the store already lists it.
    pub async fn ensure_bucket(&self) -> Result<()> {
        let bucket = self.storage.bucket();
        let buckets = self
            .storage
            .list_buckets()
            .await
            .context("Failed to list buckets")?;

        if buckets.iter().any(|b| b == bucket) {
            return Ok(());
        }

        tracing::info!("🪣 Bucket '{}' not found, creating...", bucket);
        self.storage
            .create_bucket()
            .await
            .with_context(|| format!("Failed to create bucket '{}'", bucket))?;
        tracing::info!("✅ Bucket '{}' is ready", bucket);
        Ok(())
    }

    pub async fn initiate_upload(&self, key: &str) -> Result<UploadSession> {
        let upload_id = self
            .storage
            .create_multipart_upload(key)
            .await
            .with_context(|| format!("Failed to initiate multipart upload for {}", key))?;

        Ok(UploadSession {
            upload_id,
            key: key.to_string(),
            parts: Vec::new(),
        })
    }

    /// Upload the reader as consecutive parts of `chunk_size` bytes, numbered from 1.
    /// Returns the parts added to the session.
    pub async fn upload_parts<R>(
        &self,
        session: &mut UploadSession,
        mut reader: R,
    ) -> Result<Vec<CompletedPartInfo>>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut part_number = session.parts.len() as i32 + 1;
        let first_new = session.parts.len();

        loop {
            let mut n = 0;
            while n < self.chunk_size {
                let read = reader
                    .read(&mut buffer[n..])
                    .await
                    .with_context(|| format!("Failed to read local file for {}", session.key))?;
                if read == 0 {
                    break;
                }
                n += read;
            }

            if n == 0 {
                break;
            }

            let etag = self
                .storage
                .upload_part(
                    &session.key,
                    &session.upload_id,
                    part_number,
                    buffer[..n].to_vec(),
                )
                .await
                .with_context(|| {
                    format!("Failed to upload part {} of {}", part_number, session.key)
                })?;

            tracing::debug!(
                "Uploaded part {} ({} bytes) of {}",
                part_number,
                n,
                session.key
            );

            session.parts.push(CompletedPartInfo { part_number, etag });
            part_number += 1;

            if n < self.chunk_size {
                break;
            }
        }

        Ok(session.parts[first_new..].to_vec())
    }

    pub async fn complete_upload(&self, session: &UploadSession) -> Result<()> {
        let mut parts = session.parts.clone();
        parts.sort_by_key(|p| p.part_number);

        self.storage
            .complete_multipart_upload(&session.key, &session.upload_id, &parts)
            .await
            .with_context(|| format!("Failed to complete multipart upload for {}", session.key))
    }

    pub async fn abort_upload(&self, session: &UploadSession) -> Result<()> {
        self.storage
            .abort_multipart_upload(&session.key, &session.upload_id)
            .await
            .with_context(|| format!("Failed to abort multipart upload for {}", session.key))
    }

    /// Copy the local file for `key` to the object store. Failures are logged
    /// and reported in the outcome, never returned.
    pub async fn replicate(&self, key: &str) -> ReplicationOutcome {
        self.replicate_until(key, &CancellationToken::new()).await
    }

    /// Like [`replicate`](Self::replicate), but gives up when `cancel` fires.
    /// An upload already initiated is aborted before returning.
    pub async fn replicate_until(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> ReplicationOutcome {
        match self.try_replicate(key, cancel).await {
            Ok(parts) => {
                tracing::info!("✅ Replicated {} ({} parts)", key, parts);
                ReplicationOutcome::Completed { parts }
            }
            Err(e) => {
                tracing::error!("❌ Replication of {} failed: {:#}", key, e);
                ReplicationOutcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    async fn try_replicate(&self, key: &str, cancel: &CancellationToken) -> Result<usize> {
        let file = tokio::select! {
            file = self.open_for_upload(key) => file?,
            _ = cancel.cancelled() => bail!("Replication of {} cancelled before upload", key),
        };

        let mut session = self.initiate_upload(key).await?;

        let uploaded = tokio::select! {
            parts = self.upload_parts(&mut session, file) => parts,
            _ = cancel.cancelled() => Err(anyhow!("Replication of {} cancelled", key)),
        };

        let result = match uploaded {
            Ok(parts) if parts.is_empty() => {
                // Zero-part completion is rejected by the store. The upload is
                // settled by this abort, whatever happens to the empty object.
                self.abort_upload(&session).await?;
                self.storage
                    .upload_file(key, Vec::new())
                    .await
                    .with_context(|| format!("Failed to store empty object {}", key))?;
                return Ok(0);
            }
            Ok(parts) => tokio::select! {
                done = self.complete_upload(&session) => done.map(|_| parts.len()),
                _ = cancel.cancelled() => Err(anyhow!("Replication of {} cancelled", key)),
            },
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(abort_err) = self.abort_upload(&session).await {
                tracing::warn!("{:#}", abort_err);
            }
        }

        result
    }

    async fn open_for_upload(&self, key: &str) -> Result<tokio::fs::File> {
        self.ensure_bucket().await?;
        self.cache
            .open(key)
            .await
            .with_context(|| format!("Failed to open local file for {}", key))
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use file_ingest_backend::config::AppConfig;
use file_ingest_backend::infrastructure::database;
use file_ingest_backend::services::file_service::FileService;
use file_ingest_backend::services::local_cache::LocalCache;
use file_ingest_backend::services::replication_queue::{ReplicationJob, ReplicationQueue};
use file_ingest_backend::services::storage::{CompletedPartInfo, StorageService};
use sea_orm::{Database, DatabaseConnection};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, mpsc};

pub const MIB: usize = 1024 * 1024;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub fn test_config(storage_dir: &Path) -> AppConfig {
    AppConfig {
        storage_dir: storage_dir.to_path_buf(),
        ..AppConfig::default()
    }
}

/// File service whose replication queue is observed directly by the test
pub async fn file_service_with_queue(
    db: DatabaseConnection,
    storage_dir: &Path,
) -> (FileService, mpsc::Receiver<ReplicationJob>) {
    let cache = LocalCache::new(storage_dir, 64 * 1024).await.unwrap();
    let (queue, rx) = ReplicationQueue::channel(16);
    (FileService::new(db, cache, queue), rx)
}

pub struct PendingUpload {
    pub key: String,
    pub parts: BTreeMap<i32, (String, Vec<u8>)>,
}

#[derive(Default)]
pub struct MockState {
    pub buckets: Vec<String>,
    pub create_bucket_calls: usize,
    pub initiated: usize,
    pub uploads: HashMap<String, PendingUpload>,
    pub objects: HashMap<String, Vec<u8>>,
    /// (key, part_number, size) for every part call
    pub part_calls: Vec<(String, i32, usize)>,
    pub completed: Vec<(String, Vec<CompletedPartInfo>)>,
    pub aborted: Vec<String>,
    pub fail_on_part: Option<i32>,
    pub fail_complete: bool,
    pub fail_put: bool,
}

/// In-memory object store with multipart semantics close to S3:
/// completion needs at least one part, ascending numbers and matching etags.
pub struct MockStorageService {
    bucket: String,
    state: Mutex<MockState>,
    bucket_gate: Option<Arc<Semaphore>>,
    part_gate: Option<Arc<Semaphore>>,
}

impl MockStorageService {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(MockState::default()),
            bucket_gate: None,
            part_gate: None,
        }
    }

    pub fn with_existing_bucket(bucket: &str) -> Self {
        let mock = Self::new(bucket);
        mock.state().buckets.push(bucket.to_string());
        mock
    }

    /// Every `list_buckets` call waits for a permit from `gate`
    pub fn with_gate(bucket: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            bucket_gate: Some(gate),
            ..Self::new(bucket)
        }
    }

    /// Every `upload_part` call waits for a permit from `gate`
    pub fn with_part_gate(bucket: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            part_gate: Some(gate),
            ..Self::new(bucket)
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_buckets(&self) -> anyhow::Result<Vec<String>> {
        if let Some(gate) = &self.bucket_gate {
            let _permit = gate.acquire().await?;
        }
        Ok(self.state().buckets.clone())
    }

    async fn create_bucket(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        state.create_bucket_calls += 1;
        if !state.buckets.contains(&self.bucket) {
            state.buckets.push(self.bucket.clone());
        }
        Ok(())
    }

    async fn upload_file(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let mut state = self.state();
        if state.fail_put {
            anyhow::bail!("InternalError: put rejected");
        }
        state.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String> {
        let mut state = self.state();
        state.initiated += 1;
        let upload_id = format!("upload-{}", state.initiated);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> anyhow::Result<String> {
        if let Some(gate) = &self.part_gate {
            let _permit = gate.acquire().await?;
        }

        let mut state = self.state();
        state
            .part_calls
            .push((key.to_string(), part_number, data.len()));

        if state.fail_on_part == Some(part_number) {
            anyhow::bail!("InternalError: part {} rejected", part_number);
        }

        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| anyhow::anyhow!("NoSuchUpload: {}", upload_id))?;
        let etag = format!("\"etag-{}-{}\"", upload_id, part_number);
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> anyhow::Result<()> {
        let mut state = self.state();
        if state.fail_complete {
            anyhow::bail!("InternalError: completion rejected");
        }
        if parts.is_empty() {
            anyhow::bail!("MalformedXML: no parts");
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            anyhow::bail!("InvalidPartOrder");
        }

        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| anyhow::anyhow!("NoSuchUpload: {}", upload_id))?;

        let mut object = Vec::new();
        for part in parts {
            let (etag, data) = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow::anyhow!("InvalidPart: {}", part.part_number))?;
            if *etag != part.etag {
                anyhow::bail!("InvalidPart: etag mismatch for {}", part.part_number);
            }
            object.extend_from_slice(data);
        }

        state.objects.insert(key.to_string(), object);
        state.completed.push((key.to_string(), parts.to_vec()));
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> anyhow::Result<()> {
        let mut state = self.state();
        if state.uploads.remove(upload_id).is_none() {
            anyhow::bail!("NoSuchUpload: {}", upload_id);
        }
        state.aborted.push(upload_id.to_string());
        Ok(())
    }
}

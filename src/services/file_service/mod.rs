use crate::services::local_cache::LocalCache;
use crate::services::replication_queue::ReplicationQueue;
use sea_orm::DatabaseConnection;

pub mod retrieval;
pub mod types;
pub mod upload;

pub use types::FileContent;
pub use upload::split_filename;

pub struct FileService {
    db: DatabaseConnection,
    cache: LocalCache,
    replication: ReplicationQueue,
}

impl FileService {
    pub fn new(db: DatabaseConnection, cache: LocalCache, replication: ReplicationQueue) -> Self {
        Self {
            db,
            cache,
            replication,
        }
    }
}

pub mod file_service;
pub mod janitor;
pub mod local_cache;
pub mod replication;
pub mod replication_queue;
pub mod storage;

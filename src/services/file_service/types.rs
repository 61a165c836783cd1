use crate::entities::file_records;
use tokio::fs::File;

/// Metadata plus an open handle on the locally cached bytes
#[derive(Debug)]
pub struct FileContent {
    pub record: file_records::Model,
    pub file: File,
    pub len: u64,
}

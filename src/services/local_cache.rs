use std::path::PathBuf;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Directory of locally cached uploads, one file per record named by its storage key.
#[derive(Debug, Clone)]
pub struct LocalCache {
    base_dir: PathBuf,
    chunk_size: usize,
}

impl LocalCache {
    pub async fn new(base_dir: impl Into<PathBuf>, chunk_size: usize) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Stream `reader` into the file for `key`, truncating any previous content.
    /// Returns the number of bytes written.
    pub async fn write_stream<R>(&self, key: &str, mut reader: R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.path_for(key);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).await?;
            written += n as u64;
        }

        file.flush().await?;
        tracing::debug!("Wrote {} bytes to {:?}", written, path);

        Ok(written)
    }

    pub async fn open(&self, key: &str) -> std::io::Result<File> {
        File::open(self.path_for(key)).await
    }
}

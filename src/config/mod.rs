use std::env;
use std::path::PathBuf;

/// Smallest part size the multipart protocol accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Relational metadata store connection parameters
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,

    /// Full connection URL, takes precedence over the individual fields
    pub url_override: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5432,
            name: "files".to_string(),
            url_override: None,
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        match &self.url_override {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            ),
        }
    }
}

/// S3-compatible object store used as the replication target
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Endpoint URL (e.g. a MinIO address). `None` uses the AWS default endpoint.
    pub endpoint_url: Option<String>,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            bucket: "files".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Application configuration, built once at startup and passed to every component
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,

    pub object_store: ObjectStoreConfig,

    /// Directory holding one local file per record (default: "../static")
    pub storage_dir: PathBuf,

    /// Chunk size for local writes and multipart parts in bytes (default: 5 MB)
    pub chunk_size: usize,

    /// Local file retention window for the janitor sweep (default: 7 days)
    pub file_expiration_days: u64,

    /// Seconds between janitor sweeps (default: 3600)
    pub janitor_interval_secs: u64,

    /// Number of replication worker tasks (default: 4)
    pub replication_workers: usize,

    /// Bounded replication queue length (default: 1024)
    pub replication_queue_capacity: usize,

    /// How long shutdown waits for in-flight replications (default: 30s)
    pub replication_shutdown_grace_secs: u64,

    /// Maximum request body size in bytes (default: 1 GB)
    pub max_file_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            object_store: ObjectStoreConfig::default(),
            storage_dir: PathBuf::from("../static"),
            chunk_size: MIN_PART_SIZE,
            file_expiration_days: 7,
            janitor_interval_secs: 3600,
            replication_workers: 4,
            replication_queue_capacity: 1024,
            replication_shutdown_grace_secs: 30,
            max_file_size: 1024 * 1024 * 1024, // 1 GB
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let database = DatabaseConfig {
            user: env::var("POSTGRES_USER").unwrap_or(default.database.user),
            password: env::var("POSTGRES_PASSWORD").unwrap_or(default.database.password),
            host: env::var("POSTGRES_HOST").unwrap_or(default.database.host),
            port: env_parse("POSTGRES_PORT", default.database.port),
            name: env::var("POSTGRES_DB").unwrap_or(default.database.name),
            url_override: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
        };

        let object_store = ObjectStoreConfig {
            endpoint_url: env::var("S3_URL").ok().filter(|v| !v.is_empty()),
            bucket: env::var("S3_BUCKET_NAME").unwrap_or(default.object_store.bucket),
            access_key_id: env::var("AWS_ACCESS_KEY_ID")
                .unwrap_or(default.object_store.access_key_id),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY")
                .unwrap_or(default.object_store.secret_access_key),
            region: env::var("AWS_REGION_NAME").unwrap_or(default.object_store.region),
        };

        let mut chunk_size = env_parse("CHUNK_SIZE", default.chunk_size);
        if chunk_size < MIN_PART_SIZE {
            tracing::warn!(
                "CHUNK_SIZE={} is below the multipart minimum, using {} bytes",
                chunk_size,
                MIN_PART_SIZE
            );
            chunk_size = MIN_PART_SIZE;
        }

        Self {
            database,
            object_store,
            storage_dir: env::var("STATIC_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),
            chunk_size,
            file_expiration_days: env_parse("FILE_EXPIRATION_DAYS", default.file_expiration_days),
            janitor_interval_secs: env_parse(
                "JANITOR_INTERVAL_SECS",
                default.janitor_interval_secs,
            ),
            replication_workers: env_parse("REPLICATION_WORKERS", default.replication_workers)
                .max(1),
            replication_queue_capacity: env_parse(
                "REPLICATION_QUEUE_CAPACITY",
                default.replication_queue_capacity,
            )
            .max(1),
            replication_shutdown_grace_secs: env_parse(
                "REPLICATION_SHUTDOWN_GRACE_SECS",
                default.replication_shutdown_grace_secs,
            ),
            max_file_size: env_parse("MAX_FILE_SIZE", default.max_file_size),
        }
    }

    /// Create config for local development (sqlite, MinIO on localhost)
    pub fn development() -> Self {
        Self {
            database: DatabaseConfig {
                url_override: Some("sqlite://files.db?mode=rwc".to_string()),
                ..DatabaseConfig::default()
            },
            object_store: ObjectStoreConfig {
                endpoint_url: Some("http://127.0.0.1:9000".to_string()),
                bucket: "files".to_string(),
                access_key_id: "minioadmin".to_string(),
                secret_access_key: "minioadmin".to_string(),
                region: "us-east-1".to_string(),
            },
            storage_dir: PathBuf::from("./static"),
            replication_workers: 2,
            ..Self::default()
        }
    }
}

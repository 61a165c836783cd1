use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use file_ingest_backend::config::AppConfig;
use file_ingest_backend::infrastructure::{database, storage};
use file_ingest_backend::services::file_service::FileService;
use file_ingest_backend::services::janitor::Janitor;
use file_ingest_backend::services::local_cache::LocalCache;
use file_ingest_backend::services::replication::MultipartUploader;
use file_ingest_backend::services::replication_queue::ReplicationPool;
use file_ingest_backend::services::storage::StorageService;
use file_ingest_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Api,
    Janitor,
    All,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Port for the API server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Run a single janitor sweep and exit (janitor mode only)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_ingest_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting File Ingest Backend [Mode: {:?}]...", args.mode);

    let config = AppConfig::from_env();
    info!(
        "🛡️  Config: Static={:?}, Chunk={}MB, Max Size={}MB, Retention={}d",
        config.storage_dir,
        config.chunk_size / 1024 / 1024,
        config.max_file_size / 1024 / 1024,
        config.file_expiration_days
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let janitor = Janitor::new(
        config.storage_dir.clone(),
        Duration::from_secs(config.file_expiration_days * 24 * 60 * 60),
        Duration::from_secs(config.janitor_interval_secs),
        shutdown_rx.clone(),
    );

    // 2. Standalone janitor needs no database or object store
    if args.mode == Mode::Janitor {
        if args.once {
            let report = janitor.sweep().await;
            info!("👋 Janitor removed {} files, exiting.", report.removed);
            return Ok(());
        }

        let handle = tokio::spawn(janitor.run());
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
        let _ = handle.await;
        info!("👋 Janitor exited cleanly.");
        return Ok(());
    }

    // 3. Common infrastructure
    let db = database::setup_database(&config.database).await?;
    let storage_service: Arc<dyn StorageService> =
        storage::setup_storage(&config.object_store).await;
    let cache = LocalCache::new(&config.storage_dir, config.chunk_size).await?;

    let uploader = Arc::new(MultipartUploader::new(
        storage_service.clone(),
        cache.clone(),
        config.chunk_size,
    ));
    let (replication_queue, replication_pool) = ReplicationPool::start(
        uploader,
        config.replication_workers,
        config.replication_queue_capacity,
    );

    let mut handles = Vec::new();

    if args.mode == Mode::All {
        handles.push(tokio::spawn(janitor.run()));
        info!("🧹 Janitor initialized.");
    }

    // 4. API service
    let file_service = Arc::new(FileService::new(db.clone(), cache, replication_queue));

    let state = AppState {
        db: db.clone(),
        storage: storage_service.clone(),
        file_service,
        config: config.clone(),
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!(
        "📖 Swagger UI documentation: http://localhost:{}/swagger-ui",
        args.port
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 5. Stop background services
    info!("🛑 Shutting down backend services...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }

    let report = replication_pool
        .shutdown(Duration::from_secs(config.replication_shutdown_grace_secs))
        .await;
    if !report.is_clean() {
        error!(
            "❌ {} replications abandoned ({} in flight, {} queued)",
            report.abandoned_in_flight.len() + report.abandoned_queued.len(),
            report.abandoned_in_flight.len(),
            report.abandoned_queued.len()
        );
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}

pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;

use crate::config::AppConfig;
use crate::services::file_service::FileService;
use crate::services::storage::StorageService;
use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::upload::upload_file,
        api::handlers::files::download::get_file,
        api::handlers::files::download::download_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::files::types::FileRecordResponse,
            api::handlers::files::types::UploadFileForm,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "File ingestion and retrieval endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub file_service: Arc<FileService>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    // Headroom for multipart boundaries and the size field
    let body_limit = state.config.max_file_size + 10 * 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/upload_file", post(api::handlers::files::upload_file))
        .route("/file/:id", get(api::handlers::files::get_file))
        .route("/file/:id/download", get(api::handlers::files::download_file))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

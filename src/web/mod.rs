//! HTTP front end: the upload form, result pages, stored files and the JSON API

pub mod api;
pub mod error;
pub mod files;
pub mod flash;
pub mod form;
pub mod pages;
pub mod ui;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::image_processing::{apply, RawParams};
pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Inputs for one dispatcher call
#[derive(Debug)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub operation: String,
    pub params: RawParams,
}

/// Run the dispatcher on the blocking pool so image work never stalls the reactor
pub async fn run_job(state: &AppState, job: Job) -> Result<PathBuf, ApiError> {
    let base_dir = state.config.base_dir.clone();
    tokio::task::spawn_blocking(move || {
        apply(&job.input, &job.output, &job.operation, &job.params, &base_dir)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("processing task failed: {}", e)))?
    .map_err(ApiError::from)
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_content_length;

    Router::new()
        .route("/", get(ui::index))
        .route("/process", post(ui::process))
        .route("/result/:result_id", get(ui::result))
        .route("/results/:filename", get(ui::result_file))
        .route("/uploads/:filename", get(ui::upload_file))
        .route("/download/:result_id", get(ui::download))
        .route("/health", get(api::health))
        .route("/api/operations", get(api::operations))
        .route("/api/process", post(api::process))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Create the storage folders, bind and serve until the process is stopped
pub async fn serve(config: Config) -> Result<()> {
    config
        .ensure_directories()
        .context("Failed to prepare storage folders")?;

    let addr = config.bind_address();
    info!("{}", "=".repeat(60));
    info!("Server starting on http://{}", addr);
    info!("Base dir: {}", config.base_dir.display());
    info!("Uploads:  {}", config.upload_folder.display());
    info!("Results:  {}", config.results_folder.display());
    info!("{}", "-".repeat(60));
    info!("Endpoints:");
    info!("  GET  /                    - Upload form");
    info!("  POST /process             - Process an uploaded image");
    info!("  GET  /result/:id          - Result page");
    info!("  GET  /results/:file       - Processed image");
    info!("  GET  /uploads/:file       - Uploaded image");
    info!("  GET  /download/:id        - Download a result");
    info!("  GET  /api/operations      - Operation registry");
    info!("  POST /api/process         - Process via JSON or multipart");
    info!("  GET  /health              - Health check");
    info!("{}", "=".repeat(60));

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

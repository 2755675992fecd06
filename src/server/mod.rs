pub mod api;
pub mod error;

use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

/// Paths of the precomputed files; handlers read them per request.
#[derive(Clone)]
pub struct AppState {
    pub dataset_path: Arc<PathBuf>,
    pub analysis_path: Arc<PathBuf>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        AppState {
            dataset_path: Arc::new(config.dataset_path().to_path_buf()),
            analysis_path: Arc::new(config.output.analysis_path.clone()),
        }
    }
}

/// API routes, with everything else served from `static_dir`.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(api::health_handler))
        .route("/api/dataset", get(api::dataset_handler))
        .route("/api/analysis", get(api::analysis_handler))
        .route("/api/countries", get(api::countries_handler))
        .route("/api/m2", get(api::m2_handler))
        .route("/api/m2/{code}", get(api::m2_country_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: &AppConfig, port: u16) -> Result<()> {
    let state = AppState::from_config(config);
    let static_dir = &config.output.static_dir;

    info!("Registering routes:");
    info!("  GET /health");
    info!("  GET /api/dataset  ({})", state.dataset_path.display());
    info!("  GET /api/analysis ({})", state.analysis_path.display());
    info!("  GET /api/countries");
    info!("  GET /api/m2?countries=US,CN&base=USD");
    info!("  GET /api/m2/{{code}}?base=USD");
    info!("  GET /* (static files from {})", static_dir.display());

    let app = router(state, static_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

//! Axum router configuration

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, ws, AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    // Multipart framing adds overhead on top of the file itself.
    let body_limit = state.config.processing.max_file_size_bytes as usize + 64 * 1024;

    let api_v1 = Router::new()
        .route("/documents/upload", post(handlers::upload))
        .route("/documents/history", get(handlers::history))
        .route("/documents/:id", get(handlers::get_document))
        .route("/documents/:id", delete(handlers::delete_document))
        .route("/documents/:id/progress", get(handlers::get_progress))
        .route("/documents/:id/result", get(handlers::get_result))
        .route("/documents/:id/recommend-views", post(handlers::recommend_views))
        .route("/documents/:id/switch-view", post(handlers::switch_view))
        .route("/documents/:id/views/status", get(handlers::views_status));

    Router::new()
        .nest("/api/v1", api_v1)
        .route("/ws/progress/:task_id", get(ws::progress_ws))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

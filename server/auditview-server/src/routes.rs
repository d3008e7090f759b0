use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{audit, export, health},
    server::AppState,
};

/// Create health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health::health_check))
}

/// Create audit log viewing routes
pub fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/logs", get(audit::search_logs))
        .route("/logs/:id", get(audit::get_log_detail))
        .route("/statistics", get(audit::get_statistics))
}

/// Create export routes
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/export", post(export::request_export))
        .route("/export", get(export::list_exports))
        .route("/export/:id/status", get(export::get_export_status))
        .route("/export/:id/download", get(export::download_export))
}

/// Create the application router with all routes
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .nest("/api/audit", audit_routes().merge(export_routes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

use super::handlers;

pub fn build_router(state: Arc<AppState>) -> Router {
    let camera_routes = Router::new()
        .route("/cameras/{id}", get(handlers::camera_status))
        .route("/cameras/{id}/retry", post(handlers::retry))
        .route("/cameras/{id}/attach", post(handlers::attach))
        .route("/cameras/{id}/release", post(handlers::release))
        .route("/cameras/{id}/frame", get(handlers::frame))
        .route("/cameras/{id}/fullscreen", get(handlers::fullscreen))
        .route("/cameras/{id}/recording", post(handlers::toggle_recording))
        .route("/cameras/{id}/snapshot", post(handlers::snapshot))
        .route("/cameras/{id}/files", get(handlers::files))
        .route(
            "/cameras/{id}/files/{kind}/{name}",
            get(handlers::download_file).delete(handlers::delete_file),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/events", get(handlers::events))
        .route("/fullscreen/close", post(handlers::close_fullscreen))
        .route("/recording/toggle-all", post(handlers::toggle_all_recording))
        .route("/snapshots", post(handlers::snapshot_all))
        .route("/backend/cameras", get(handlers::backend_cameras))
        .merge(camera_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

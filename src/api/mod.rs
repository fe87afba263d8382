pub mod actions;
pub mod reply;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::SharedState;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/cloudburst/find-zone-id", post(actions::connect))
        .route("/cloudburst/purge", post(actions::purge))
        .route("/cloudburst/clear", post(actions::clear))
        .route("/cloudburst/status", get(actions::status))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

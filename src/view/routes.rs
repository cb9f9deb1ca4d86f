use axum::{routing::get, Router};
use std::sync::Arc;

use super::gateway::ViewGateway;
use super::handlers::{view_events, view_map};

pub fn create_view_router(gateway: Arc<ViewGateway>) -> Router {
    Router::new()
        .route("/view", get(view_events))
        .route("/view/map", get(view_map))
        .with_state(gateway)
}

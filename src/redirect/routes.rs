use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use crate::ingest::IngestionPipeline;

use super::handlers::{health_check, ingest_click};
use super::middleware::record_request_start;

pub fn create_redirect_router(pipeline: Arc<IngestionPipeline>) -> Router {
    Router::new()
        .route("/", get(ingest_click))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(record_request_start))
        .with_state(pipeline)
}

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::client_addr::client_address;
use super::middleware::RequestStart;
use crate::ingest::{ClickRequest, IngestOutcome, IngestionPipeline, RejectReason};

#[derive(Debug, Default, Deserialize)]
pub struct ClickParams {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub dst: Option<String>,
    pub pin_hash: Option<String>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Status answered alongside the deterrent location for a rejected click.
pub fn reject_status(reason: &RejectReason) -> StatusCode {
    match reason {
        RejectReason::NameTooLong { .. }
        | RejectReason::InvalidDestination(_)
        | RejectReason::InvalidScope => StatusCode::BAD_REQUEST,
        RejectReason::Denylisted => StatusCode::FORBIDDEN,
        RejectReason::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    }
}

/// Record a click and send the browser on to its destination
pub async fn ingest_click(
    State(pipeline): State<Arc<IngestionPipeline>>,
    Query(params): Query<ClickParams>,
    request: Request,
) -> Response {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let started = request.extensions().get::<RequestStart>().copied();

    let click = ClickRequest {
        ref_name: params.ref_name,
        destination: params.dst,
        pin_hash: params.pin_hash,
        request_id: header_string(headers, "x-request-id"),
        address: client_address(headers, peer),
        user_agent: header_string(headers, header::USER_AGENT.as_str()).unwrap_or_default(),
    };

    match pipeline.ingest(click).await {
        IngestOutcome::Redirected { event_id, location } => {
            let mut response_headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&event_id) {
                response_headers.insert("x-refcollector-event-id", value);
            }
            if let Some(RequestStart(start)) = started {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                response_headers.insert("x-refcollector-timing-ms", HeaderValue::from(elapsed_ms));
            }

            (response_headers, Redirect::temporary(&location)).into_response()
        }
        IngestOutcome::Rejected { reason, deterrent } => (
            reject_status(&reason),
            [(header::LOCATION, deterrent)],
            "request rejected",
        )
            .into_response(),
        IngestOutcome::FailedPersist { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to record click").into_response()
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

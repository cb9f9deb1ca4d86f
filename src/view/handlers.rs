use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::gateway::{ViewError, ViewFilters, ViewFormat, ViewGateway, ViewRange};

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    pub pin: Option<String>,
    pub range: Option<String>,
    pub fmt: Option<String>,
    pub name: Option<String>,
    pub ip: Option<String>,
}

impl ViewParams {
    fn filters(&self) -> ViewFilters {
        ViewFilters {
            name: self.name.clone(),
            address: self.ip.clone(),
        }
    }
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        match self {
            ViewError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            ViewError::Storage(_) | ViewError::Render(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to load events").into_response()
            }
        }
    }
}

async fn respond(
    gateway: &ViewGateway,
    params: &ViewParams,
    format: ViewFormat,
) -> Result<Response, ViewError> {
    let scope = gateway.authenticate(params.pin.as_deref())?;
    let range = ViewRange::from_param(params.range.as_deref());
    let body = gateway
        .render(&scope, range, &params.filters(), format)
        .await?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// List the caller's clicks as JSON (default), CSV or a map
pub async fn view_events(
    State(gateway): State<Arc<ViewGateway>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ViewError> {
    let format = ViewFormat::from_param(params.fmt.as_deref());
    respond(&gateway, &params, format).await
}

pub async fn view_map(
    State(gateway): State<Arc<ViewGateway>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ViewError> {
    respond(&gateway, &params, ViewFormat::Map).await
}

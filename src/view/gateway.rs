use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use super::render;
use crate::access::{AccessScope, ScopeKey};
use crate::models::{now_nanos, Event, EventQuery};
use crate::storage::EventStore;

const LAST_DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewRange {
    /// The 24 hours up to now
    #[default]
    LastDay,
    All,
}

impl ViewRange {
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("all") => ViewRange::All,
            _ => ViewRange::LastDay,
        }
    }

    /// `(from, to]` bounds in nanoseconds for a view taken at `now`.
    pub fn bounds(&self, now: i64) -> (i64, i64) {
        match self {
            ViewRange::LastDay => (now.saturating_sub(LAST_DAY.as_nanos() as i64), now),
            ViewRange::All => (i64::MIN, i64::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewFormat {
    #[default]
    Json,
    Csv,
    Map,
}

impl ViewFormat {
    /// Unrecognised formats fall back to JSON.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("csv") => ViewFormat::Csv,
            Some("map") => ViewFormat::Map,
            _ => ViewFormat::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ViewFormat::Json => "application/json",
            ViewFormat::Csv => "text/csv; charset=utf-8",
            ViewFormat::Map => "text/html; charset=utf-8",
        }
    }
}

/// Optional exact-match filters on top of the scope and range.
#[derive(Debug, Clone, Default)]
pub struct ViewFilters {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("add \"pin\" query param")]
    Unauthorized,
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("render error: {0}")]
    Render(String),
}

/// Read-only access to stored clicks, partitioned by PIN-derived scope.
pub struct ViewGateway {
    store: Arc<dyn EventStore>,
    scope_key: ScopeKey,
}

impl ViewGateway {
    pub fn new(store: Arc<dyn EventStore>, scope_key: ScopeKey) -> Self {
        Self { store, scope_key }
    }

    /// Map a PIN to the scope it unlocks. Any non-empty PIN is accepted;
    /// a PIN nobody used simply selects an empty partition.
    pub fn authenticate(&self, pin: Option<&str>) -> Result<AccessScope, ViewError> {
        let pin = pin.filter(|p| !p.is_empty()).ok_or(ViewError::Unauthorized)?;
        self.scope_key.derive(pin).map_err(ViewError::Storage)
    }

    pub async fn events(
        &self,
        scope: &AccessScope,
        range: ViewRange,
        filters: &ViewFilters,
    ) -> Result<Vec<Event>, ViewError> {
        let (from, to) = range.bounds(now_nanos());
        let query = EventQuery {
            scope: scope.clone(),
            from,
            to,
            name: filters.name.clone().filter(|n| !n.is_empty()),
            address: filters.address.clone().filter(|a| !a.is_empty()),
        };

        let events = self.store.query_by_scope(&query).await.map_err(|e| {
            error!(error = %e, "failed to query events");
            ViewError::Storage(e)
        })?;
        debug!(count = events.len(), range = ?range, "events selected");
        Ok(events)
    }

    pub async fn render(
        &self,
        scope: &AccessScope,
        range: ViewRange,
        filters: &ViewFilters,
        format: ViewFormat,
    ) -> Result<Vec<u8>, ViewError> {
        let events = self.events(scope, range, filters).await?;

        match format {
            ViewFormat::Json => render::render_json(&events),
            ViewFormat::Csv => render::render_csv(&events),
            ViewFormat::Map => render::render_map(&events),
        }
    }
}

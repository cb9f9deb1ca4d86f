use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::access::AccessScope;

/// Approximate location of a client address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// One recorded click.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    /// Nanoseconds since the Unix epoch
    pub created_at: i64,
    pub name: String,
    pub destination: String,
    pub request_address: String,
    pub user_agent: String,
    #[serde(flatten)]
    pub geolocation: Option<GeoLocation>,
    #[serde(skip_serializing)]
    pub access_scope: AccessScope,
}

/// A click ready to be persisted; the store stamps `created_at`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: String,
    pub name: String,
    pub destination: String,
    pub request_address: String,
    pub user_agent: String,
    pub geolocation: Option<GeoLocation>,
    pub access_scope: AccessScope,
}

impl NewEvent {
    pub fn into_event(self, created_at: i64) -> Event {
        Event {
            id: self.id,
            created_at,
            name: self.name,
            destination: self.destination,
            request_address: self.request_address,
            user_agent: self.user_agent,
            geolocation: self.geolocation,
            access_scope: self.access_scope,
        }
    }
}

/// Scoped selection of events for viewing.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub scope: AccessScope,
    /// Exclusive lower bound, nanoseconds
    pub from: i64,
    /// Inclusive upper bound, nanoseconds
    pub to: i64,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Outcome of an offline repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub deleted: u64,
    pub backfilled: u64,
    pub unresolved: u64,
}

/// Flat row shape shared by both SQL backends.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub created_at: i64,
    pub name: String,
    pub destination: String,
    pub request_address: String,
    pub user_agent: String,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub access_scope: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct GeoRow {
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoRow {
    /// Coordinates decide whether a row carries a resolved location.
    pub fn into_location(self) -> Option<GeoLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                continent: self.continent,
                country: self.country,
                region: self.region,
                city: self.city,
                postal_code: self.postal_code,
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        let geolocation = GeoRow {
            continent: row.continent,
            country: row.country,
            region: row.region,
            city: row.city,
            postal_code: row.postal_code,
            latitude: row.latitude,
            longitude: row.longitude,
        }
        .into_location();

        Event {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            destination: row.destination,
            request_address: row.request_address,
            user_agent: row.user_agent,
            geolocation,
            access_scope: AccessScope::from_stored(row.access_scope),
        }
    }
}

/// Current time in nanoseconds since the Unix epoch.
///
/// Event timestamps and abuse windows must both come from here.
pub fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}

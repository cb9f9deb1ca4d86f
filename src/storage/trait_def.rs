use crate::models::{Event, EventQuery, GeoLocation, NewEvent, RepairReport};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event id already recorded")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for click events.
///
/// Every read that returns events is restricted to a single access scope.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Persist a click, stamping `created_at` at insert time.
    /// A duplicate id yields [`StorageError::Conflict`].
    async fn insert(&self, event: NewEvent) -> StorageResult<Event>;

    /// Located events of one scope in `(from, to]`, in insertion order
    async fn query_by_scope(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// Number of distinct events from `address` in `(from, to]`
    async fn count_by_address(&self, address: &str, from: i64, to: i64) -> Result<i64>;

    /// Most recently stored location for `address`, if any event has one
    async fn latest_geolocation(&self, address: &str) -> Result<Option<GeoLocation>>;

    /// Offline maintenance: drop unscoped rows, backfill missing locations
    async fn repair(&self) -> Result<RepairReport>;
}

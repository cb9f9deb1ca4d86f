use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::{GeoError, GeoProvider};
use crate::config::GeoConfig;
use crate::models::GeoLocation;
use crate::storage::EventStore;

/// Resolves client addresses, preferring known locations over live lookups.
pub struct GeoResolver {
    store: Arc<dyn EventStore>,
    provider: Arc<dyn GeoProvider>,
    /// Successful resolutions by address; also coalesces concurrent misses
    memo: Cache<String, GeoLocation>,
    default_timeout: Duration,
}

impl GeoResolver {
    pub fn new(
        store: Arc<dyn EventStore>,
        provider: Arc<dyn GeoProvider>,
        config: &GeoConfig,
    ) -> Self {
        let memo = Cache::builder()
            .max_capacity(config.cache_max_entries)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Self {
            store,
            provider,
            memo,
            default_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Resolve `address` before `deadline` (the configured timeout from now
    /// when `None`).
    ///
    /// The deadline covers the cache query and the provider call together;
    /// once it passes the pending lookup is dropped and
    /// [`GeoError::Timeout`] is returned.
    pub async fn resolve(
        &self,
        address: &str,
        deadline: Option<Instant>,
    ) -> Result<GeoLocation, GeoError> {
        let deadline = deadline.unwrap_or_else(|| Instant::now() + self.default_timeout);

        let lookup = self
            .memo
            .try_get_with(address.to_string(), self.lookup_uncached(address));

        match time::timeout_at(deadline, lookup).await {
            Ok(Ok(location)) => Ok(location),
            Ok(Err(err)) => Err(err.as_ref().clone()),
            Err(_) => Err(GeoError::Timeout),
        }
    }

    async fn lookup_uncached(&self, address: &str) -> Result<GeoLocation, GeoError> {
        match self.store.latest_geolocation(address).await {
            Ok(Some(location)) => {
                debug!(address, "geolocation served from stored events");
                return Ok(location);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(address, error = %err, "geolocation cache query failed, asking provider");
            }
        }

        self.provider.lookup(address).await
    }
}

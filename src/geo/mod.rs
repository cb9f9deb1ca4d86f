//! Client address geolocation
//!
//! Locations are looked up through a [`GeoProvider`] (an external
//! IP-geolocation API) only when neither the in-process memo nor an
//! earlier stored event already knows the address.

pub mod bots;
pub mod ipstack;
pub mod resolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::GeoLocation;

pub use bots::BotFilter;
pub use ipstack::IpStackProvider;
pub use resolver::GeoResolver;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoError {
    #[error("geolocation lookup timed out")]
    Timeout,
    #[error("geolocation provider error: {0}")]
    Upstream(String),
    #[error("malformed geolocation payload: {0}")]
    Parse(String),
}

/// A live source of locations, consulted on cache misses.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<GeoLocation, GeoError>;
}

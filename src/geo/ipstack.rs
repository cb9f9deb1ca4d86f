//! ipstack-compatible HTTP geolocation provider

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::debug;
use url::Url;

use super::{GeoError, GeoProvider};
use crate::config::GeoConfig;
use crate::models::GeoLocation;

#[derive(Clone)]
pub struct IpStackProvider {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpStackResponse {
    success: Option<bool>,
    error: Option<IpStackFailure>,
    continent_name: Option<String>,
    country_name: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    zip: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IpStackFailure {
    code: Option<i64>,
    info: Option<String>,
}

impl IpStackProvider {
    pub fn from_config(config: &GeoConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("refcollector-geo/0.1.0")
            .build()
            .context("failed to build HTTP client for geolocation lookups")?;

        let base_url = Url::parse(&config.provider_url)
            .with_context(|| format!("invalid geolocation provider URL '{}'", config.provider_url))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn lookup_url(&self, address: &str, api_key: &str) -> Result<Url, GeoError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GeoError::Upstream("provider URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(address);
        url.query_pairs_mut().append_pair("access_key", api_key);
        Ok(url)
    }
}

#[async_trait]
impl GeoProvider for IpStackProvider {
    async fn lookup(&self, address: &str) -> Result<GeoLocation, GeoError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeoError::Upstream("no provider API key configured".to_string()))?;

        if address.parse::<IpAddr>().is_err() {
            return Err(GeoError::Upstream(format!("'{address}' is not an IP address")));
        }

        let url = self.lookup_url(address, api_key)?;
        debug!(address, "querying geolocation provider");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeoError::Upstream(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Upstream(format!("provider answered {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeoError::Upstream(e.without_url().to_string()))?;

        parse_payload(&body)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Decode a provider response body into a location.
pub fn parse_payload(body: &str) -> Result<GeoLocation, GeoError> {
    let payload: IpStackResponse =
        serde_json::from_str(body).map_err(|e| GeoError::Parse(e.to_string()))?;

    if payload.success == Some(false) || payload.error.is_some() {
        let (code, info) = payload
            .error
            .map(|e| (e.code, e.info))
            .unwrap_or((None, None));
        return Err(GeoError::Upstream(format!(
            "provider rejected lookup (code {}): {}",
            code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
            info.unwrap_or_else(|| "no details".to_string())
        )));
    }

    let (Some(latitude), Some(longitude)) = (payload.latitude, payload.longitude) else {
        return Err(GeoError::Parse("payload has no coordinates".to_string()));
    };

    Ok(GeoLocation {
        continent: non_empty(payload.continent_name),
        country: non_empty(payload.country_name),
        region: non_empty(payload.region_name),
        city: non_empty(payload.city),
        postal_code: non_empty(payload.zip),
        latitude,
        longitude,
    })
}

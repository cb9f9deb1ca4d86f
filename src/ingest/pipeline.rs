use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::access::{AccessScope, ScopeKey};
use crate::config::{Config, DeterrentConfig};
use crate::geo::{BotFilter, GeoError, GeoProvider, GeoResolver};
use crate::guard::{AbuseDecision, AbuseGuard};
use crate::models::{now_nanos, GeoLocation, NewEvent};
use crate::storage::{EventStore, StorageError};

/// Referral tag stored when a click carries none.
pub const UNKNOWN_REF: &str = "unknown";

/// Everything the pipeline needs to know about one inbound click.
#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    pub ref_name: Option<String>,
    pub destination: Option<String>,
    /// Pre-derived scope token selecting who may view this click
    pub pin_hash: Option<String>,
    /// Caller-supplied idempotency key, used as the event id
    pub request_id: Option<String>,
    pub address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NameTooLong { len: usize, max: usize },
    InvalidDestination(String),
    InvalidScope,
    Denylisted,
    RateLimited { count: i64 },
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// The click is stored (now or by an earlier attempt with the same id).
    /// `location` is the destination serialized as an ASCII URI.
    Redirected { event_id: String, location: String },
    /// Nothing was stored; the client goes to `deterrent` instead.
    Rejected {
        reason: RejectReason,
        deterrent: String,
    },
    /// The click could not be stored and the client is not redirected.
    FailedPersist {
        event_id: String,
        error: StorageError,
    },
}

/// Input that passed validation.
#[derive(Debug, Clone)]
struct ValidClick {
    id: String,
    name: String,
    /// As supplied; this is what gets stored
    destination: String,
    location: Url,
    scope: AccessScope,
}

/// Result of the geolocation stage. Only `Resolved` attaches a location.
#[derive(Debug)]
enum GeoStage {
    Resolved(GeoLocation),
    SkippedBot,
    Failed(GeoError),
}

impl GeoStage {
    fn into_location(self) -> Option<GeoLocation> {
        match self {
            GeoStage::Resolved(location) => Some(location),
            GeoStage::SkippedBot | GeoStage::Failed(_) => None,
        }
    }
}

pub struct IngestionPipeline {
    store: Arc<dyn EventStore>,
    guard: AbuseGuard,
    geo: GeoResolver,
    bots: BotFilter,
    default_destination: String,
    max_name_len: usize,
    deterrents: DeterrentConfig,
    default_scope: AccessScope,
}

impl IngestionPipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn EventStore>,
        provider: Arc<dyn GeoProvider>,
    ) -> Result<Self> {
        let default_scope = ScopeKey::new(&config.access.salt).derive(&config.access.default_pin)?;

        Ok(Self {
            guard: AbuseGuard::new(Arc::clone(&store), &config.guard),
            geo: GeoResolver::new(Arc::clone(&store), provider, &config.geo),
            bots: BotFilter::new(config.geo.bot_markers.clone()),
            store,
            default_destination: config.ingest.default_destination.clone(),
            max_name_len: config.ingest.max_name_len,
            deterrents: config.ingest.deterrents.clone(),
            default_scope,
        })
    }

    /// Run one click through validate → abuse check → geolocate → persist.
    pub async fn ingest(&self, click: ClickRequest) -> IngestOutcome {
        let valid = match self.validate(&click) {
            Ok(valid) => valid,
            Err(reason) => return self.reject(reason, &click),
        };

        match self.guard.check(&click.address, now_nanos()).await {
            AbuseDecision::Allow => {}
            AbuseDecision::Denylisted => return self.reject(RejectReason::Denylisted, &click),
            AbuseDecision::RateLimited { count } => {
                return self.reject(RejectReason::RateLimited { count }, &click)
            }
        }

        let geolocation = match self.resolve_geo(&click).await {
            GeoStage::Failed(err) => {
                warn!(
                    event_id = %valid.id,
                    address = %click.address,
                    error = %err,
                    "geolocation unavailable, storing click without location"
                );
                None
            }
            stage => stage.into_location(),
        };

        self.persist(valid, &click, geolocation).await
    }

    fn validate(&self, click: &ClickRequest) -> Result<ValidClick, RejectReason> {
        let name = click
            .ref_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_REF);

        let len = name.chars().count();
        if len > self.max_name_len {
            return Err(RejectReason::NameTooLong {
                len,
                max: self.max_name_len,
            });
        }

        let destination = click
            .destination
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(self.default_destination.as_str());

        let location =
            Url::parse(destination).map_err(|e| RejectReason::InvalidDestination(e.to_string()))?;

        let scope = match click.pin_hash.as_deref().filter(|p| !p.is_empty()) {
            Some(token) => AccessScope::parse(token).ok_or(RejectReason::InvalidScope)?,
            None => self.default_scope.clone(),
        };

        let id = click
            .request_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(ValidClick {
            id,
            name: name.to_string(),
            destination: destination.to_string(),
            location,
            scope,
        })
    }

    async fn resolve_geo(&self, click: &ClickRequest) -> GeoStage {
        if self.bots.is_bot(&click.user_agent) {
            debug!(address = %click.address, "crawler user agent, skipping geolocation");
            return GeoStage::SkippedBot;
        }

        match self.geo.resolve(&click.address, None).await {
            Ok(location) => GeoStage::Resolved(location),
            Err(err) => GeoStage::Failed(err),
        }
    }

    async fn persist(
        &self,
        valid: ValidClick,
        click: &ClickRequest,
        geolocation: Option<GeoLocation>,
    ) -> IngestOutcome {
        let event = NewEvent {
            id: valid.id.clone(),
            name: valid.name,
            destination: valid.destination,
            request_address: click.address.clone(),
            user_agent: click.user_agent.clone(),
            geolocation,
            access_scope: valid.scope,
        };

        match self.store.insert(event).await {
            Ok(event) => {
                info!(
                    event_id = %event.id,
                    name = %event.name,
                    address = %event.request_address,
                    located = event.geolocation.is_some(),
                    "click recorded"
                );
                IngestOutcome::Redirected {
                    event_id: event.id,
                    location: valid.location.into(),
                }
            }
            Err(StorageError::Conflict) => {
                info!(event_id = %valid.id, address = %click.address, "click already recorded");
                IngestOutcome::Redirected {
                    event_id: valid.id,
                    location: valid.location.into(),
                }
            }
            Err(err) => {
                error!(
                    event_id = %valid.id,
                    address = %click.address,
                    error = %err,
                    "failed to record click"
                );
                IngestOutcome::FailedPersist {
                    event_id: valid.id,
                    error: err,
                }
            }
        }
    }

    fn reject(&self, reason: RejectReason, click: &ClickRequest) -> IngestOutcome {
        warn!(
            address = %click.address,
            request_id = click.request_id.as_deref().unwrap_or("-"),
            reason = ?reason,
            "click rejected"
        );

        let deterrent = match reason {
            RejectReason::NameTooLong { .. } => &self.deterrents.oversized_name,
            RejectReason::InvalidDestination(_) | RejectReason::InvalidScope => {
                &self.deterrents.invalid_destination
            }
            RejectReason::Denylisted => &self.deterrents.denylisted,
            RejectReason::RateLimited { .. } => &self.deterrents.rate_limited,
        };

        IngestOutcome::Rejected {
            deterrent: deterrent.clone(),
            reason,
        }
    }
}

//! Per-address abuse guard.
//!
//! The window is recomputed from stored event timestamps on every
//! request; there is no in-process counter. Counting is best-effort: a
//! failed count query lets the request through.

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::storage::EventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseDecision {
    Allow,
    Denylisted,
    RateLimited { count: i64 },
}

impl AbuseDecision {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, AbuseDecision::Allow)
    }
}

/// Static set of always-blocked addresses, exact or by network.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    networks: Vec<IpNet>,
    exact: HashSet<String>,
}

impl Denylist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<IpNet>() {
                Ok(net) => list.networks.push(net),
                Err(_) => {
                    list.exact.insert(entry.to_string());
                }
            }
        }
        list
    }

    pub fn contains(&self, address: &str) -> bool {
        if self.exact.contains(address) {
            return true;
        }
        match address.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|net| net.contains(&ip)),
            Err(_) => false,
        }
    }
}

pub struct AbuseGuard {
    store: Arc<dyn EventStore>,
    window: Duration,
    threshold: i64,
    denylist: Denylist,
}

impl AbuseGuard {
    pub fn new(store: Arc<dyn EventStore>, config: &GuardConfig) -> Self {
        Self {
            store,
            window: Duration::from_secs(config.window_secs),
            threshold: config.threshold,
            denylist: Denylist::new(&config.denylist),
        }
    }

    /// Decide whether `address` may proceed at `now` (nanoseconds since epoch).
    pub async fn check(&self, address: &str, now: i64) -> AbuseDecision {
        if self.denylist.contains(address) {
            return AbuseDecision::Denylisted;
        }

        let window_nanos = i64::try_from(self.window.as_nanos()).unwrap_or(i64::MAX);
        let from = now.saturating_sub(window_nanos);

        match self.store.count_by_address(address, from, now).await {
            Ok(count) => {
                debug!(address, count, window_secs = self.window.as_secs(), "recent requests");
                if count > self.threshold {
                    AbuseDecision::RateLimited { count }
                } else {
                    AbuseDecision::Allow
                }
            }
            Err(err) => {
                warn!(address, error = %err, "abuse count failed, allowing request");
                AbuseDecision::Allow
            }
        }
    }

    pub async fn should_block(&self, address: &str, now: i64) -> bool {
        self.check(address, now).await.is_blocked()
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub access: AccessConfig,
    pub ingest: IngestConfig,
    pub geo: GeoConfig,
    pub guard: GuardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Shared secret material used to derive access scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// PIN whose scope tags events that carry no explicit `pin_hash`
    pub default_pin: String,
    /// Server-side salt mixed into every scope digest
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Where clicks without a `dst` parameter are sent
    pub default_destination: String,
    /// Maximum referral name length, in characters
    pub max_name_len: usize,
    pub deterrents: DeterrentConfig,
}

/// Redirect targets handed to rejected requests instead of their destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterrentConfig {
    pub oversized_name: String,
    pub invalid_destination: String,
    pub denylisted: String,
    pub rate_limited: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub provider_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub cache_max_entries: u64,
    pub cache_ttl_secs: u64,
    /// User-agent substrings that mark crawlers (matched case-sensitively)
    pub bot_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub window_secs: u64,
    /// Requests allowed inside one window; one more gets blocked
    pub threshold: i64,
    /// Addresses or CIDR networks that are always blocked
    pub denylist: Vec<String>,
}

impl Default for DeterrentConfig {
    fn default() -> Self {
        Self {
            oversized_name: "https://media1.giphy.com/media/j3IxJRLNLZz9sXR7ZA/giphy.gif"
                .to_string(),
            invalid_destination: "https://media4.giphy.com/media/3ohuAAAIvICvEs4Psc/giphy.gif"
                .to_string(),
            denylisted: "https://c.tenor.com/qA9u4ETE66MAAAAC/hello-there-kenobi.gif".to_string(),
            rate_limited: "https://media0.giphy.com/media/tB8Wl0JABkSkQa7vGE/giphy.gif"
                .to_string(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            provider_url: "http://api.ipstack.com".to_string(),
            api_key: None,
            timeout_ms: GeoConfig::DEFAULT_TIMEOUT_MS,
            cache_max_entries: 10_000,
            cache_ttl_secs: 3600,
            bot_markers: vec!["bot".to_string(), "ahrefs".to_string()],
        }
    }
}

impl GeoConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 300;
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            threshold: 10,
            denylist: Vec::new(),
        }
    }
}

impl IngestConfig {
    pub const DEFAULT_MAX_NAME_LEN: usize = 40;
}

/// Read an optional variable, treating an empty value as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_required(key: &str) -> anyhow::Result<String> {
    env_opt(key).with_context(|| format!("env var {key} is required"))
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("env var {key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_opt(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str = env_opt("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url =
            env_opt("DATABASE_URL").unwrap_or_else(|| "sqlite://./refcollector.db".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let host = env_opt("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env_parse("PORT", 3000u16)?;

        let default_pin = env_required("PIN")?;
        let salt = env_required("SALT")?;

        let default_destination = env_required("DEFAULT_DEST")?;
        url::Url::parse(&default_destination)
            .with_context(|| format!("DEFAULT_DEST '{default_destination}' is not a valid URL"))?;
        let max_name_len = env_parse("MAX_REF_NAME_LEN", IngestConfig::DEFAULT_MAX_NAME_LEN)?;

        let fallback = DeterrentConfig::default();
        let deterrents = DeterrentConfig {
            oversized_name: env_opt("DETERRENT_OVERSIZED_NAME_URL")
                .unwrap_or(fallback.oversized_name),
            invalid_destination: env_opt("DETERRENT_INVALID_DEST_URL")
                .unwrap_or(fallback.invalid_destination),
            denylisted: env_opt("DETERRENT_DENYLISTED_URL").unwrap_or(fallback.denylisted),
            rate_limited: env_opt("DETERRENT_RATE_LIMITED_URL").unwrap_or(fallback.rate_limited),
        };

        let geo_defaults = GeoConfig::default();
        let timeout_ms = match env_opt("LOC_TIMEOUT").map(|raw| raw.trim().parse::<u64>()) {
            Some(Ok(ms)) => ms,
            Some(Err(_)) => {
                tracing::warn!(
                    "LOC_TIMEOUT is not a whole number of milliseconds, using default {}ms",
                    GeoConfig::DEFAULT_TIMEOUT_MS
                );
                GeoConfig::DEFAULT_TIMEOUT_MS
            }
            None => GeoConfig::DEFAULT_TIMEOUT_MS,
        };
        let geo = GeoConfig {
            provider_url: env_opt("GEO_PROVIDER_URL").unwrap_or(geo_defaults.provider_url),
            api_key: env_opt("IPSTACK_API_KEY"),
            timeout_ms,
            cache_max_entries: env_parse("GEO_CACHE_MAX_ENTRIES", geo_defaults.cache_max_entries)?,
            cache_ttl_secs: env_parse("GEO_CACHE_TTL_SECS", geo_defaults.cache_ttl_secs)?,
            bot_markers: env_list("BOT_USER_AGENTS").unwrap_or(geo_defaults.bot_markers),
        };

        if geo.api_key.is_none() {
            tracing::warn!("IPSTACK_API_KEY is not set, clicks without a cached location stay unlocated");
        }

        let guard_defaults = GuardConfig::default();
        let guard = GuardConfig {
            window_secs: env_parse("ABUSE_WINDOW_SECS", guard_defaults.window_secs)?,
            threshold: env_parse("ABUSE_THRESHOLD", guard_defaults.threshold)?,
            denylist: env_list("BLOCKED_IPS").unwrap_or_default(),
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            access: AccessConfig { default_pin, salt },
            ingest: IngestConfig {
                default_destination,
                max_name_len,
                deterrents,
            },
            geo,
            guard,
        })
    }
}

//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a partial file (or no file at all)
//! still yields a working configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::sources::subgraph::RetryPolicy;
use crate::storage::DEFAULT_CACHE_FILE;
use crate::types::MarketSource;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub endpoints: EndpointsConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub fetch: FetchConfig,
    pub chart: ChartConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Omen bets subgraph (Gnosis).
    pub omen_bets: String,
    /// Mech marketplace subgraph used by Omen agents.
    pub omen_mech: String,
    /// Polymarket agents bets subgraph (Polygon).
    pub polymarket_bets: String,
    /// Mech marketplace subgraph used by Polymarket agents.
    pub polymarket_mech: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            omen_bets: "https://api.subgraph.staging.autonolas.tech/api/proxy/predict-omen"
                .to_string(),
            omen_mech:
                "https://api.subgraph.staging.autonolas.tech/api/proxy/mech-marketplace-gnosis"
                    .to_string(),
            polymarket_bets: "https://predict-polymarket-agents.subgraph.autonolas.tech/"
                .to_string(),
            polymarket_mech: "https://api.subgraph.autonolas.tech/api/proxy/marketplace-polygon"
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub path: String,
    /// TTL for entries used by the `last` command.
    pub ttl_secs: i64,
    /// TTL for entries used by the `timeline` command.
    pub timeline_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_CACHE_FILE.to_string(),
            ttl_secs: 60 * 60,
            timeline_ttl_secs: 3 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub timeline_timeout_secs: u64,
    /// Total attempts per request in the timeline variant (1 original + retries).
    pub timeline_max_attempts: u32,
    /// First backoff delay; doubles on every further attempt.
    pub backoff_base_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            timeline_timeout_secs: 90,
            timeline_max_attempts: 4,
            backoff_base_secs: 3,
            user_agent: format!("tool-accuracy/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Single attempt, short timeout.
    pub fn simple_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: 1,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
        }
    }

    /// Retrying policy for long timeline fetches.
    pub fn timeline_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeline_timeout_secs),
            max_attempts: self.timeline_max_attempts.max(1),
            backoff_base: Duration::from_secs(self.backoff_base_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    /// Subgraph page size (the upstream caps `first` at 1000).
    pub page_size: usize,
    pub omen_mech_lookback_days: i64,
    pub polymarket_mech_lookback_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            omen_mech_lookback_days: 14,
            polymarket_mech_lookback_days: 70,
        }
    }
}

impl FetchConfig {
    /// How far back to look for mech requests in the `last` command.
    pub fn mech_lookback_secs(&self, source: MarketSource) -> i64 {
        let days = match source {
            MarketSource::Omen => self.omen_mech_lookback_days,
            MarketSource::Polymarket => self.polymarket_mech_lookback_days,
        };
        days.saturating_mul(86_400)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    /// Minimum non-empty bins for a tool to get its own line.
    pub min_points: usize,
    pub width: u16,
    pub height: u16,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            min_points: 2,
            width: 120,
            height: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Endpoints (bets, mech) for a market source.
    pub fn endpoints_for(&self, source: MarketSource) -> (&str, &str) {
        match source {
            MarketSource::Omen => (&self.endpoints.omen_bets, &self.endpoints.omen_mech),
            MarketSource::Polymarket => (
                &self.endpoints.polymarket_bets,
                &self.endpoints.polymarket_mech,
            ),
        }
    }
}

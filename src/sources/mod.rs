//! Data sources.
//!
//! Defines the `BetSource` trait and provides implementations for:
//! - Omen (Gnosis): answer encoded as a hex `currentAnswer`
//! - Polymarket (Polygon): explicit `resolution.winningIndex`
//!
//! plus the cached mech-request source and the GraphQL transport they
//! all share.

pub mod mech;
pub mod omen;
pub mod polymarket;
pub mod subgraph;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{age_label, bets_key, CacheEntry, CacheStore};
use crate::types::{Bet, MarketSource};

use self::mech::{MechRequestSource, MechSubgraph};
use self::omen::OmenBetSource;
use self::polymarket::PolymarketBetSource;
use self::subgraph::{RetryPolicy, SubgraphClient};

/// Abstraction over prediction-market bet data.
///
/// Implementations only ever return bets on resolved markets.
#[async_trait]
pub trait BetSource: Send + Sync {
    /// The `count` most recent resolved bets, newest first.
    async fn fetch_latest(&self, count: usize) -> Result<Vec<Bet>>;

    /// All resolved bets with `start <= timestamp <= end`, oldest first.
    async fn fetch_range(&self, start: i64, end: i64) -> Result<Vec<Bet>>;

    /// Source name for logging and cache keys.
    fn name(&self) -> &str;
}

/// Range-bounded fetch through the cache.
///
/// Re-fetches when the entry is missing or no longer fresh. The entry is
/// only written after the full range has been fetched.
pub async fn fetch_range_cached(
    source: &dyn BetSource,
    cache: &mut dyn CacheStore,
    start: i64,
    end: i64,
    now: i64,
    ttl_secs: i64,
) -> Result<Vec<Bet>> {
    let key = bets_key(source.name(), start, end);

    if let Some(entry) = cache.get(&key).filter(|e| e.is_fresh(now, ttl_secs)) {
        if let Some(bets) = entry.as_bets() {
            info!(
                source = source.name(),
                count = bets.len(),
                age = %age_label(entry.fetched_at, now),
                "Using cached bets"
            );
            return Ok(bets.to_vec());
        }
    }

    info!(source = source.name(), start, end, "Fetching bets from subgraph");
    let bets = source
        .fetch_range(start, end)
        .await
        .with_context(|| format!("Failed to fetch {} bets", source.name()))?;
    cache.put(key, CacheEntry::bets(now, bets.clone()));
    Ok(bets)
}

/// Build the bet source and mech-request source for a market back-end.
pub fn build_sources(
    cfg: &AppConfig,
    market: MarketSource,
    policy: RetryPolicy,
    ttl_secs: i64,
) -> Result<(Box<dyn BetSource>, MechRequestSource)> {
    let (bets_url, mech_url) = cfg.endpoints_for(market);
    let user_agent = cfg.http.user_agent.as_str();
    let page_size = cfg.fetch.page_size;

    let bets_client = Box::new(SubgraphClient::new(bets_url, policy, user_agent)?);
    let bets: Box<dyn BetSource> = match market {
        MarketSource::Omen => Box::new(OmenBetSource::new(bets_client, page_size)),
        MarketSource::Polymarket => Box::new(PolymarketBetSource::new(bets_client, page_size)),
    };

    let mech_client = Box::new(SubgraphClient::new(mech_url, policy, user_agent)?);
    let mech = MechRequestSource::new(
        market.as_str(),
        Box::new(MechSubgraph::new(mech_client)),
        page_size,
        ttl_secs,
    );

    Ok((bets, mech))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

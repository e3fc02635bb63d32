//! End-to-end runs.
//!
//! Fetch bets, attribute tools, aggregate. The binary only adds argument
//! handling and printing on top of these.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::info;

use crate::cli::TimeWindow;
use crate::engine::aggregator::{aggregate, overall_known, Timeline};
use crate::engine::enricher::{Enricher, EnrichmentReport};
use crate::sources::{fetch_range_cached, BetSource};
use crate::storage::CacheStore;
use crate::types::{Bet, OverallStats, ToolStats};

/// Outcome of one accuracy run.
#[derive(Debug, Clone)]
pub struct AccuracySummary {
    pub enrichment: EnrichmentReport,
    pub stats: Vec<ToolStats>,
    pub overall: Option<OverallStats>,
}

impl AccuracySummary {
    fn from_enrichment(enrichment: EnrichmentReport) -> Self {
        let stats = aggregate(&enrichment.bets);
        let overall = overall_known(&stats);
        Self {
            enrichment,
            stats,
            overall,
        }
    }

    pub fn bet_count(&self) -> usize {
        self.enrichment.bets.len()
    }
}

/// A windowed run: whole-window statistics plus the binned view.
#[derive(Debug, Clone)]
pub struct TimelineSummary {
    pub summary: AccuracySummary,
    pub timeline: Timeline,
}

fn log_fetched(bets: &[Bet]) {
    let agents = bets.iter().map(|b| b.bettor.as_str()).collect::<HashSet<_>>().len();
    info!(bets = bets.len(), agents, "Resolved bets fetched");
}

/// Accuracy over the `count` most recent resolved bets.
///
/// Mech requests are looked up from `since` onwards. Returns `None` when
/// the source has no resolved bets.
pub async fn run_last(
    source: &dyn BetSource,
    enricher: &Enricher,
    cache: &mut dyn CacheStore,
    count: usize,
    since: i64,
    now: i64,
) -> Result<Option<AccuracySummary>> {
    info!(count, source = source.name(), "Fetching last resolved bets");
    let bets = source
        .fetch_latest(count)
        .await
        .with_context(|| format!("Failed to fetch latest {} bets", source.name()))?;
    if bets.is_empty() {
        return Ok(None);
    }
    log_fetched(&bets);

    let enrichment = enricher.enrich(cache, bets, since, now).await;
    info!(
        enriched = enrichment.bets.len(),
        matched = enrichment.matched(),
        failed_agents = enrichment.failed_agents,
        "Bets enriched"
    );
    Ok(Some(AccuracySummary::from_enrichment(enrichment)))
}

/// Accuracy over every resolved bet in `window`, binned over time.
///
/// Bets and mech requests go through the cache with `ttl_secs`. Returns
/// `None` when the window holds no resolved bets.
pub async fn run_timeline(
    source: &dyn BetSource,
    enricher: &Enricher,
    cache: &mut dyn CacheStore,
    window: TimeWindow,
    now: i64,
    ttl_secs: i64,
) -> Result<Option<TimelineSummary>> {
    let bets = fetch_range_cached(source, cache, window.start, window.end, now, ttl_secs).await?;
    if bets.is_empty() {
        return Ok(None);
    }
    log_fetched(&bets);

    let enrichment = enricher.enrich(cache, bets, window.start, now).await;
    info!(
        enriched = enrichment.bets.len(),
        matched = enrichment.matched(),
        failed_agents = enrichment.failed_agents,
        "Bets enriched"
    );

    let timeline = Timeline::build(&enrichment.bets, window.start, window.end);
    Ok(Some(TimelineSummary {
        summary: AccuracySummary::from_enrichment(enrichment),
        timeline,
    }))
}

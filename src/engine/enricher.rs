//! Tool attribution pipeline.
//!
//! Fetches each distinct agent's mech requests once (through the cache),
//! matches every bet against its own agent's requests and tags it with
//! the tool of the chosen request. Agents whose requests cannot be
//! fetched are skipped; their bets end up as `unknown`.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::matcher::{choose_request, match_requests};
use crate::sources::mech::MechRequestSource;
use crate::storage::CacheStore;
use crate::types::{Bet, EnrichedBet, MechRequest, UNKNOWN_TOOL};

/// Log progress every this many agents.
const PROGRESS_EVERY: usize = 20;

/// Result of one enrichment pass.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    /// Bets in input order, each tagged with a tool.
    pub bets: Vec<EnrichedBet>,
    /// Distinct agents seen.
    pub agents: usize,
    /// Agents whose mech requests could not be fetched.
    pub failed_agents: usize,
}

impl EnrichmentReport {
    /// Number of bets attributed to a known tool.
    pub fn matched(&self) -> usize {
        self.bets.iter().filter(|b| b.is_known()).count()
    }
}

/// Attaches tools to bets using an agent's mech request history.
pub struct Enricher {
    mech: MechRequestSource,
}

impl Enricher {
    pub fn new(mech: MechRequestSource) -> Self {
        Self { mech }
    }

    /// Tag every bet with the tool that most likely produced it.
    ///
    /// Never fails: per-agent fetch errors are logged and counted in
    /// `failed_agents`.
    pub async fn enrich(
        &self,
        cache: &mut dyn CacheStore,
        bets: Vec<Bet>,
        since: i64,
        now: i64,
    ) -> EnrichmentReport {
        let agents = distinct_agents(&bets);
        info!(
            agents = agents.len(),
            bets = bets.len(),
            source = self.mech.source_name(),
            "Fetching mech tool data"
        );

        let mut requests: HashMap<&str, Vec<MechRequest>> = HashMap::with_capacity(agents.len());
        let mut failed_agents = 0;

        for (i, agent) in agents.iter().enumerate() {
            let n = i + 1;
            if n % PROGRESS_EVERY == 0 || n == agents.len() {
                info!(progress = n, total = agents.len(), "Agent requests");
            }

            match self.mech.fetch_for_agent(cache, agent, since, now).await {
                Ok(reqs) => {
                    debug!(agent = %agent, requests = reqs.len(), "Agent requests loaded");
                    requests.insert(agent.as_str(), reqs);
                }
                Err(e) => {
                    warn!(agent = %agent, error = %format!("{e:#}"), "Failed to fetch mech requests, skipping agent");
                    failed_agents += 1;
                }
            }
        }

        if failed_agents > 0 {
            warn!(failed_agents, "Some agents were skipped; their bets will be 'unknown'");
        }

        let agent_count = agents.len();
        let enriched = bets
            .into_iter()
            .map(|bet| {
                let reqs = requests.get(bet.bettor.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                tag_bet(bet, reqs)
            })
            .collect();

        EnrichmentReport {
            bets: enriched,
            agents: agent_count,
            failed_agents,
        }
    }
}

/// Distinct bettors in first-seen order.
fn distinct_agents(bets: &[Bet]) -> Vec<String> {
    let mut seen = HashSet::new();
    bets.iter()
        .filter(|b| seen.insert(b.bettor.as_str()))
        .map(|b| b.bettor.clone())
        .collect()
}

/// Tag a single bet from its agent's requests.
pub fn tag_bet(bet: Bet, requests: &[MechRequest]) -> EnrichedBet {
    let matches = match_requests(&bet, requests);
    let tool = choose_request(&bet, &matches)
        .and_then(MechRequest::tool)
        .unwrap_or(UNKNOWN_TOOL)
        .to_string();

    EnrichedBet { bet, tool }
}

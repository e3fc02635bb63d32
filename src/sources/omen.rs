//! Omen (Gnosis) bets subgraph.
//!
//! Markets are `FixedProductMarketMaker`s; a resolved market carries a
//! `currentAnswer` encoded as a hex word. Unresolved markets are excluded
//! server-side with `currentAnswer_not: null`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::subgraph::GraphQl;
use super::BetSource;
use crate::types::{de_i64, de_opt_string, Bet};

const SOURCE_NAME: &str = "omen";

const LATEST_BETS_QUERY: &str = r#"
query LatestResolvedBets($first: Int!, $skip: Int!) {
  bets(
    first: $first
    skip: $skip
    orderBy: timestamp
    orderDirection: desc
    where: { fixedProductMarketMaker_: { currentAnswer_not: null } }
  ) {
    id
    timestamp
    bettor { id serviceId }
    outcomeIndex
    fixedProductMarketMaker { currentAnswer question }
  }
}
"#;

const RANGE_BETS_QUERY: &str = r#"
query ResolvedBetsInRange($first: Int!, $skip: Int!, $start: BigInt!, $end: BigInt!) {
  bets(
    first: $first
    skip: $skip
    orderBy: timestamp
    orderDirection: asc
    where: {
      timestamp_gte: $start
      timestamp_lte: $end
      fixedProductMarketMaker_: { currentAnswer_not: null }
    }
  ) {
    id
    timestamp
    bettor { id serviceId }
    outcomeIndex
    fixedProductMarketMaker { currentAnswer question }
  }
}
"#;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BetsPage {
    #[serde(default)]
    bets: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOmenBet {
    id: String,
    #[serde(deserialize_with = "de_i64")]
    timestamp: i64,
    bettor: RawBettor,
    #[serde(deserialize_with = "de_i64")]
    outcome_index: i64,
    #[serde(default)]
    fixed_product_market_maker: Option<RawMarketMaker>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBettor {
    id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    service_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarketMaker {
    #[serde(default)]
    current_answer: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

/// Parse a hex `currentAnswer` into an outcome index.
///
/// Answers wider than 64 bits (the "invalid" answer is all `f`s) saturate
/// to `u64::MAX`, which never equals a chosen outcome index.
pub fn parse_hex_answer(answer: &str) -> Option<u64> {
    let digits = answer
        .strip_prefix("0x")
        .or_else(|| answer.strip_prefix("0X"))
        .unwrap_or(answer);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(0);
    }
    if significant.len() > 16 {
        return Some(u64::MAX);
    }
    u64::from_str_radix(significant, 16).ok()
}

/// Decode one raw bet, or `None` if its resolution is missing or malformed.
fn decode_bet(raw: Value) -> Option<Bet> {
    let raw: RawOmenBet = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "Skipping undecodable Omen bet");
            return None;
        }
    };

    let market = raw.fixed_product_market_maker?;
    let correct_outcome = market.current_answer.as_deref().and_then(parse_hex_answer)?;
    let chosen_outcome = u64::try_from(raw.outcome_index).ok()?;

    Some(Bet {
        bet_id: raw.id,
        timestamp: raw.timestamp,
        bettor: raw.bettor.id,
        service_id: raw.bettor.service_id,
        chosen_outcome,
        correct_outcome,
        question: market.question.unwrap_or_default(),
        question_id: None,
    })
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Bet source for the Omen subgraph.
pub struct OmenBetSource {
    gql: Box<dyn GraphQl>,
    page_size: usize,
}

impl OmenBetSource {
    pub fn new(gql: Box<dyn GraphQl>, page_size: usize) -> Self {
        Self {
            gql,
            page_size: page_size.max(1),
        }
    }

    async fn fetch_page(&self, query: &str, variables: Value) -> Result<Vec<Value>> {
        let data = self
            .gql
            .query(query, variables)
            .await
            .with_context(|| format!("Omen bets query failed ({})", self.gql.endpoint()))?;
        let page: BetsPage =
            serde_json::from_value(data).context("Failed to parse Omen bets page")?;
        Ok(page.bets)
    }
}

#[async_trait]
impl BetSource for OmenBetSource {
    async fn fetch_latest(&self, count: usize) -> Result<Vec<Bet>> {
        let mut bets = Vec::with_capacity(count.min(self.page_size));
        let mut fetched = 0usize;

        while fetched < count {
            let first = self.page_size.min(count - fetched);
            let page = self
                .fetch_page(LATEST_BETS_QUERY, json!({ "first": first, "skip": fetched }))
                .await?;
            let raw_len = page.len();
            debug!(skip = fetched, first, returned = raw_len, "Omen page fetched");

            bets.extend(page.into_iter().filter_map(decode_bet));
            fetched += raw_len;

            if raw_len < first {
                break;
            }
        }

        info!(source = SOURCE_NAME, count = bets.len(), "Latest resolved bets fetched");
        Ok(bets)
    }

    async fn fetch_range(&self, start: i64, end: i64) -> Result<Vec<Bet>> {
        let mut bets = Vec::new();
        let mut skip = 0usize;

        loop {
            let variables = json!({
                "first": self.page_size,
                "skip": skip,
                "start": start.to_string(),
                "end": end.to_string(),
            });
            let page = self.fetch_page(RANGE_BETS_QUERY, variables).await?;
            let raw_len = page.len();
            debug!(skip, returned = raw_len, "Omen range page fetched");

            bets.extend(page.into_iter().filter_map(decode_bet));

            if raw_len < self.page_size {
                break;
            }
            skip += self.page_size;
        }

        info!(source = SOURCE_NAME, start, end, count = bets.len(), "Resolved bets in range fetched");
        Ok(bets)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

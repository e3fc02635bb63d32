//! Polymarket agents bets subgraph (Polygon).
//!
//! Resolution is exposed as `question.resolution.winningIndex`. The
//! subgraph cannot filter on it, so unresolved bets are dropped here.
//! The count-bounded fetch pages backwards with an `id_lt` cursor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::subgraph::GraphQl;
use super::BetSource;
use crate::types::{de_i64, de_opt_string, Bet};

const SOURCE_NAME: &str = "polymarket";

const BETS_QUERY: &str = r#"
query TraderAgentBets($first: Int!, $skip: Int!, $direction: OrderDirection!, $where: Bet_filter!) {
  bets(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: $direction
    where: $where
  ) {
    id
    blockTimestamp
    outcomeIndex
    bettor { id serviceId }
    question {
      id
      metadata { title }
      resolution { winningIndex }
    }
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
struct RawPolymarketBet {
    id: String,
    #[serde(deserialize_with = "de_i64")]
    block_timestamp: i64,
    #[serde(deserialize_with = "de_i64")]
    outcome_index: i64,
    bettor: RawBettor,
    question: Option<RawQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBettor {
    id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    service_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    resolution: Option<RawResolution>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResolution {
    #[serde(deserialize_with = "de_i64")]
    winning_index: i64,
}

/// Raw id of a bet, used as the pagination cursor even when undecodable.
fn raw_id(raw: &Value) -> Option<String> {
    raw.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Decode one raw bet, or `None` if unresolved or malformed.
fn decode_bet(raw: Value) -> Option<Bet> {
    let raw: RawPolymarketBet = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "Skipping undecodable Polymarket bet");
            return None;
        }
    };

    let question = raw.question?;
    let resolution = question.resolution?;
    let correct_outcome = u64::try_from(resolution.winning_index).ok()?;
    let chosen_outcome = u64::try_from(raw.outcome_index).ok()?;

    Some(Bet {
        bet_id: raw.id,
        timestamp: raw.block_timestamp,
        bettor: raw.bettor.id,
        service_id: raw.bettor.service_id,
        chosen_outcome,
        correct_outcome,
        question: question.metadata.and_then(|m| m.title).unwrap_or_default(),
        question_id: Some(question.id),
    })
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Bet source for the Polymarket agents subgraph.
pub struct PolymarketBetSource {
    gql: Box<dyn GraphQl>,
    page_size: usize,
}

impl PolymarketBetSource {
    pub fn new(gql: Box<dyn GraphQl>, page_size: usize) -> Self {
        Self {
            gql,
            page_size: page_size.max(1),
        }
    }

    async fn fetch_page(&self, variables: Value) -> Result<Vec<Value>> {
        let data = self
            .gql
            .query(BETS_QUERY, variables)
            .await
            .with_context(|| format!("Polymarket bets query failed ({})", self.gql.endpoint()))?;
        let page: BetsPage =
            serde_json::from_value(data).context("Failed to parse Polymarket bets page")?;
        Ok(page.bets)
    }
}

#[async_trait]
impl BetSource for PolymarketBetSource {
    async fn fetch_latest(&self, count: usize) -> Result<Vec<Bet>> {
        let mut resolved = Vec::with_capacity(count.min(self.page_size));
        let mut cursor: Option<String> = None;

        while resolved.len() < count {
            let filter = match &cursor {
                Some(id) => json!({ "id_lt": id }),
                None => json!({}),
            };
            let page = self
                .fetch_page(json!({
                    "first": self.page_size,
                    "skip": 0,
                    "direction": "desc",
                    "where": filter,
                }))
                .await?;
            let raw_len = page.len();
            debug!(cursor = ?cursor, returned = raw_len, "Polymarket page fetched");

            let Some(last_id) = page.last().and_then(raw_id) else {
                break;
            };
            cursor = Some(last_id);

            for raw in page {
                if let Some(bet) = decode_bet(raw) {
                    resolved.push(bet);
                    if resolved.len() >= count {
                        break;
                    }
                }
            }

            if raw_len < self.page_size {
                break;
            }
        }

        info!(source = SOURCE_NAME, count = resolved.len(), "Latest resolved bets fetched");
        Ok(resolved)
    }

    async fn fetch_range(&self, start: i64, end: i64) -> Result<Vec<Bet>> {
        let mut bets = Vec::new();
        let mut skip = 0usize;

        loop {
            let page = self
                .fetch_page(json!({
                    "first": self.page_size,
                    "skip": skip,
                    "direction": "asc",
                    "where": {
                        "blockTimestamp_gte": start.to_string(),
                        "blockTimestamp_lte": end.to_string(),
                    },
                }))
                .await?;
            let raw_len = page.len();
            debug!(skip, returned = raw_len, "Polymarket range page fetched");

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

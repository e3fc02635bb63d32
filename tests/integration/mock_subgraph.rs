//! In-memory subgraph for integration testing.
//!
//! Serves the Omen, Polymarket and mech marketplace queries from fixed
//! rows, honouring `first`/`skip`, timestamp filters and the `id_lt`
//! cursor the way the real indexers do.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

use tool_accuracy::sources::subgraph::GraphQl;
use tool_accuracy::types::SubgraphError;

#[derive(Debug, Clone)]
pub struct MockBet {
    pub id: String,
    pub timestamp: i64,
    pub agent: String,
    pub outcome: u64,
    /// Winning outcome; `None` while the market is open.
    pub answer: Option<u64>,
    pub question: String,
}

#[derive(Debug, Clone)]
pub struct MockRequest {
    pub agent: String,
    pub timestamp: i64,
    pub title: String,
    pub tool: String,
}

/// Deterministic subgraph backed by vectors of rows.
#[derive(Default)]
pub struct MockSubgraph {
    bets: Vec<MockBet>,
    requests: Vec<MockRequest>,
    failing_agents: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSubgraph {
    pub fn new(bets: Vec<MockBet>, requests: Vec<MockRequest>) -> Self {
        Self {
            bets,
            requests,
            ..Default::default()
        }
    }

    /// Mech queries for `agent` fail with an HTTP 502.
    pub fn failing_agent(mut self, agent: &str) -> Self {
        self.failing_agents.push(agent.to_string());
        self
    }

    /// Operation names of every query served so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == operation).count()
    }

    fn page<T: Clone>(rows: Vec<T>, variables: &Value) -> Vec<T> {
        let skip = variables["skip"].as_u64().unwrap_or(0) as usize;
        let first = variables["first"].as_u64().unwrap_or(100) as usize;
        rows.into_iter().skip(skip).take(first).collect()
    }

    fn resolved(&self) -> Vec<MockBet> {
        self.bets.iter().filter(|b| b.answer.is_some()).cloned().collect()
    }

    fn int_var(value: &Value) -> i64 {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or_default()
    }

    // -- Omen --

    fn omen_json(bet: &MockBet) -> Value {
        json!({
            "id": bet.id,
            "timestamp": bet.timestamp.to_string(),
            "bettor": { "id": bet.agent, "serviceId": "7" },
            "outcomeIndex": bet.outcome.to_string(),
            "fixedProductMarketMaker": {
                "currentAnswer": bet.answer.map(|a| format!("0x{a:064x}")),
                "question": bet.question,
            }
        })
    }

    fn omen_latest(&self, variables: &Value) -> Value {
        let mut rows = self.resolved();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let bets: Vec<Value> = Self::page(rows, variables).iter().map(Self::omen_json).collect();
        json!({ "bets": bets })
    }

    fn omen_range(&self, variables: &Value) -> Value {
        let start = Self::int_var(&variables["start"]);
        let end = Self::int_var(&variables["end"]);
        let mut rows: Vec<MockBet> = self
            .resolved()
            .into_iter()
            .filter(|b| (start..=end).contains(&b.timestamp))
            .collect();
        rows.sort_by_key(|b| b.timestamp);
        let bets: Vec<Value> = Self::page(rows, variables).iter().map(Self::omen_json).collect();
        json!({ "bets": bets })
    }

    // -- Polymarket --

    fn polymarket_json(bet: &MockBet) -> Value {
        json!({
            "id": bet.id,
            "blockTimestamp": bet.timestamp.to_string(),
            "outcomeIndex": bet.outcome.to_string(),
            "bettor": { "id": bet.agent, "serviceId": "7" },
            "question": {
                "id": format!("q-{}", bet.id),
                "metadata": { "title": bet.question },
                "resolution": bet.answer.map(|a| json!({ "winningIndex": a.to_string() })),
            }
        })
    }

    fn polymarket(&self, variables: &Value) -> Value {
        let filter = &variables["where"];
        let mut rows: Vec<MockBet> = self.bets.clone();

        if let Some(cursor) = filter["id_lt"].as_str() {
            rows.retain(|b| b.id.as_str() < cursor);
        }
        if !filter["blockTimestamp_gte"].is_null() {
            let start = Self::int_var(&filter["blockTimestamp_gte"]);
            let end = Self::int_var(&filter["blockTimestamp_lte"]);
            rows.retain(|b| (start..=end).contains(&b.timestamp));
        }

        if variables["direction"] == "desc" {
            rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        } else {
            rows.sort_by_key(|b| b.timestamp);
        }

        let bets: Vec<Value> = Self::page(rows, variables).iter().map(Self::polymarket_json).collect();
        json!({ "bets": bets })
    }

    // -- Mech marketplace --

    fn mech(&self, variables: &Value) -> Result<Value, SubgraphError> {
        let agent = variables["id"].as_str().unwrap_or_default();
        if self.failing_agents.iter().any(|a| a == agent) {
            return Err(SubgraphError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        let own: Vec<&MockRequest> = self.requests.iter().filter(|r| r.agent == agent).collect();
        if own.is_empty() {
            return Ok(json!({ "sender": null }));
        }

        let since = Self::int_var(&variables["timestamp_gt"]);
        let mut rows: Vec<MockRequest> = own
            .into_iter()
            .filter(|r| r.timestamp > since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);

        let requests: Vec<Value> = Self::page(rows, variables)
            .iter()
            .map(|r| {
                json!({
                    "blockTimestamp": r.timestamp.to_string(),
                    "parsedRequest": { "questionTitle": r.title, "tool": r.tool, "prompt": "" }
                })
            })
            .collect();
        Ok(json!({ "sender": { "requests": requests } }))
    }
}

#[async_trait]
impl GraphQl for MockSubgraph {
    async fn query(&self, query: &str, variables: Value) -> Result<Value, SubgraphError> {
        let operation = ["MechSender", "LatestResolvedBets", "ResolvedBetsInRange", "TraderAgentBets"]
            .into_iter()
            .find(|op| query.contains(op))
            .unwrap_or("unknown");
        self.calls.lock().unwrap().push(operation.to_string());

        match operation {
            "MechSender" => self.mech(&variables),
            "LatestResolvedBets" => Ok(self.omen_latest(&variables)),
            "ResolvedBetsInRange" => Ok(self.omen_range(&variables)),
            "TraderAgentBets" => Ok(self.polymarket(&variables)),
            _ => Err(SubgraphError::GraphQl(format!("unexpected query: {query}"))),
        }
    }

    fn endpoint(&self) -> &str {
        "mock://subgraph"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(id: &str, ts: i64, answer: Option<u64>) -> MockBet {
        MockBet {
            id: id.to_string(),
            timestamp: ts,
            agent: "0xa".to_string(),
            outcome: 0,
            answer,
            question: "Q".to_string(),
        }
    }

    #[tokio::test]
    async fn test_omen_latest_skips_open_markets() {
        let mock = MockSubgraph::new(vec![bet("1", 10, Some(0)), bet("2", 20, None)], vec![]);
        let data = mock
            .query("query LatestResolvedBets", json!({ "first": 10, "skip": 0 }))
            .await
            .unwrap();
        assert_eq!(data["bets"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_sender_is_null() {
        let mock = MockSubgraph::new(vec![], vec![]);
        let data = mock
            .query("query MechSender", json!({ "id": "0xnone", "timestamp_gt": 0 }))
            .await
            .unwrap();
        assert!(data["sender"].is_null());
        assert_eq!(mock.calls(), vec!["MechSender"]);
    }

    #[tokio::test]
    async fn test_failing_agent() {
        let mock = MockSubgraph::new(vec![], vec![]).failing_agent("0xbad");
        let err = mock
            .query("query MechSender", json!({ "id": "0xbad", "timestamp_gt": 0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, SubgraphError::Status { status: 502, .. }));
    }
}

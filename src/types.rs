//! Shared types for the tool-accuracy pipeline.
//!
//! These records form the data model used across sources, engine and
//! reporting. Network payloads are decoded into them at the source
//! boundary; everything downstream works on these types only.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Tool label for bets that could not be attributed to a mech request.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Separator between the human-readable question title and embedded
/// market metadata (U+241F SYMBOL FOR UNIT SEPARATOR).
pub const QUESTION_DATA_SEPARATOR: char = '\u{241f}';

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// A resolved bet placed by a trader agent.
///
/// Only ever constructed for markets that carry a resolution, so
/// `correct_outcome` is always known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: String,
    /// Unix timestamp (seconds) of the bet.
    pub timestamp: i64,
    /// Agent (safe) address that placed the bet.
    pub bettor: String,
    #[serde(default)]
    pub service_id: Option<String>,
    pub chosen_outcome: u64,
    pub correct_outcome: u64,
    /// Full question text; may carry metadata after the separator.
    pub question: String,
    /// Question id (Polymarket only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
}

impl Bet {
    /// Whether the chosen outcome won.
    pub fn is_correct(&self) -> bool {
        self.chosen_outcome == self.correct_outcome
    }

    /// Helper to build a test bet with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, bettor: &str, timestamp: i64, question: &str, correct: bool) -> Self {
        Bet {
            bet_id: id.to_string(),
            timestamp,
            bettor: bettor.to_string(),
            service_id: Some("42".to_string()),
            chosen_outcome: 0,
            correct_outcome: if correct { 0 } else { 1 },
            question: question.to_string(),
            question_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mech requests
// ---------------------------------------------------------------------------

/// A task request sent by an agent to a mech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MechRequest {
    /// Block timestamp of the request; 0 when the indexer omitted it.
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub block_timestamp: i64,
    #[serde(default)]
    pub parsed_request: Option<ParsedRequest>,
}

/// Decoded request payload as exposed by the marketplace subgraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRequest {
    /// Question title; the indexer may truncate it.
    #[serde(default)]
    pub question_title: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl MechRequest {
    pub fn question_title(&self) -> &str {
        self.parsed_request
            .as_ref()
            .and_then(|p| p.question_title.as_deref())
            .unwrap_or("")
    }

    /// The tool named by this request, if it names a non-empty one.
    pub fn tool(&self) -> Option<&str> {
        self.parsed_request
            .as_ref()
            .and_then(|p| p.tool.as_deref())
            .filter(|t| !t.is_empty())
    }

    #[cfg(test)]
    pub fn sample(block_timestamp: i64, title: &str, tool: &str) -> Self {
        MechRequest {
            block_timestamp,
            parsed_request: Some(ParsedRequest {
                question_title: Some(title.to_string()),
                tool: Some(tool.to_string()),
                prompt: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// A bet annotated with the tool believed to have produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedBet {
    #[serde(flatten)]
    pub bet: Bet,
    pub tool: String,
}

impl EnrichedBet {
    pub fn is_known(&self) -> bool {
        self.tool != UNKNOWN_TOOL
    }

    pub fn is_correct(&self) -> bool {
        self.bet.is_correct()
    }
}

/// Accuracy statistics for one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStats {
    pub tool: String,
    pub total: u64,
    pub correct: u64,
    pub accuracy_pct: f64,
}

/// Accuracy over every known tool (excluding `unknown`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total: u64,
    pub correct: u64,
    pub accuracy_pct: f64,
}

/// `round(100 * correct / total, 1)`, or `None` when `total == 0`.
pub fn accuracy_pct(correct: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let pct = correct as f64 / total as f64 * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

// ---------------------------------------------------------------------------
// Market back-ends
// ---------------------------------------------------------------------------

/// Which prediction-market deployment to analyse.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MarketSource {
    /// Omen markets on Gnosis.
    #[default]
    Omen,
    /// Polymarket markets on Polygon.
    Polymarket,
}

impl MarketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSource::Omen => "omen",
            MarketSource::Polymarket => "polymarket",
        }
    }
}

impl fmt::Display for MarketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the GraphQL transport.
#[derive(Debug, thiserror::Error)]
pub enum SubgraphError {
    #[error("Network error after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Subgraph returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Subgraph error: {0}")]
    GraphQl(String),

    #[error("Failed to decode subgraph response: {0}")]
    Decode(String),
}

impl SubgraphError {
    /// Whether a request-level failure is worth retrying.
    ///
    /// Only connection and timeout errors qualify; application-level
    /// responses are final.
    pub fn is_transient(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Subgraph `BigInt`/`Int` fields arrive as strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(i64),
}

/// Deserialize an integer that may be encoded as a JSON string.
pub fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Like [`de_i64`], but `null` becomes 0.
pub fn de_opt_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<StrOrNum>::deserialize(deserializer)? {
        None => Ok(0),
        Some(StrOrNum::Num(n)) => Ok(n),
        Some(StrOrNum::Str(s)) if s.trim().is_empty() => Ok(0),
        Some(StrOrNum::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Deserialize an optional identifier that may be a string or a number.
pub fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StrOrNum>::deserialize(deserializer)?.map(|v| match v {
        StrOrNum::Str(s) => s,
        StrOrNum::Num(n) => n.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

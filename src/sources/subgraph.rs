//! GraphQL transport for The Graph style subgraphs.
//!
//! Every query is a JSON `POST {query, variables}`. Connection and
//! timeout errors are retried with exponential backoff up to the
//! policy's attempt cap; HTTP error statuses and GraphQL `errors`
//! payloads fail immediately.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::SubgraphError;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Timeout and retry settings for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 1,
            backoff_base: Duration::from_secs(3),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport abstraction
// ---------------------------------------------------------------------------

/// A GraphQL endpoint.
///
/// Returns the `data` object of a successful response.
#[async_trait]
pub trait GraphQl: Send + Sync {
    async fn query(&self, query: &str, variables: Value) -> Result<Value, SubgraphError>;

    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: GraphQl + ?Sized> GraphQl for std::sync::Arc<T> {
    async fn query(&self, query: &str, variables: Value) -> Result<Value, SubgraphError> {
        (**self).query(query, variables).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

/// HTTP client for one subgraph endpoint.
pub struct SubgraphClient {
    http: Client,
    endpoint: String,
    policy: RetryPolicy,
}

impl SubgraphClient {
    pub fn new(endpoint: &str, policy: RetryPolicy, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(policy.timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client for subgraph")?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            policy,
        })
    }

    /// Send the request and read the full body.
    async fn send_once(&self, body: &GraphQlRequest<'_>) -> Result<(u16, String), reqwest::Error> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl GraphQl for SubgraphClient {
    async fn query(&self, query: &str, variables: Value) -> Result<Value, SubgraphError> {
        let body = GraphQlRequest { query, variables };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(&body).await {
                Ok((status, text)) => {
                    debug!(endpoint = %self.endpoint, status, bytes = text.len(), "Subgraph response");
                    return parse_envelope(status, &text);
                }
                Err(e) if SubgraphError::is_transient(&e) => {
                    if attempt >= max_attempts {
                        return Err(SubgraphError::Transient {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        retries = max_attempts - 1,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Network error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(SubgraphError::Request(e)),
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Turn an HTTP status and body into the GraphQL `data` object.
pub fn parse_envelope(status: u16, body: &str) -> Result<Value, SubgraphError> {
    if !(200..300).contains(&status) {
        return Err(SubgraphError::Status {
            status,
            body: truncate(body, 500),
        });
    }

    let mut json: Value =
        serde_json::from_str(body).map_err(|e| SubgraphError::Decode(e.to_string()))?;

    if let Some(errors) = json.get("errors").filter(|e| !is_empty(e)) {
        return Err(SubgraphError::GraphQl(errors.to_string()));
    }

    match json.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(SubgraphError::GraphQl(format!(
            "response has no data: {}",
            truncate(body, 500)
        ))),
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Mech request source.
//!
//! Fetches every marketplace request an agent sent after a timestamp and
//! caches the result per agent. A cached entry is reused only while it is
//! fresh and its watermark (`fetched_from`) reaches back at least as far
//! as the caller needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::subgraph::GraphQl;
use crate::storage::{age_label, mech_key, CacheEntry, CacheStore};
use crate::types::MechRequest;

const MECH_SENDER_QUERY: &str = r#"
query MechSender($id: ID!, $timestamp_gt: Int!, $skip: Int, $first: Int) {
  sender(id: $id) {
    totalMarketplaceRequests
    requests(first: $first, skip: $skip, where: { blockTimestamp_gt: $timestamp_gt }) {
      blockTimestamp
      parsedRequest {
        questionTitle
        tool
        prompt
      }
    }
  }
}
"#;

// ---------------------------------------------------------------------------
// Page API
// ---------------------------------------------------------------------------

/// One page of an agent's mech requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MechRequestApi: Send + Sync {
    /// Requests sent by `agent` with `blockTimestamp > since`.
    async fn fetch_page(
        &self,
        agent: &str,
        since: i64,
        skip: usize,
        first: usize,
    ) -> Result<Vec<MechRequest>>;
}

#[derive(Debug, Deserialize)]
struct SenderData {
    sender: Option<SenderRequests>,
}

#[derive(Debug, Deserialize)]
struct SenderRequests {
    #[serde(default)]
    requests: Vec<MechRequest>,
}

/// Marketplace subgraph client for mech requests.
pub struct MechSubgraph {
    gql: Box<dyn GraphQl>,
}

impl MechSubgraph {
    pub fn new(gql: Box<dyn GraphQl>) -> Self {
        Self { gql }
    }
}

#[async_trait]
impl MechRequestApi for MechSubgraph {
    async fn fetch_page(
        &self,
        agent: &str,
        since: i64,
        skip: usize,
        first: usize,
    ) -> Result<Vec<MechRequest>> {
        let variables = json!({
            "id": agent,
            "timestamp_gt": since,
            "skip": skip,
            "first": first,
        });
        let data = self
            .gql
            .query(MECH_SENDER_QUERY, variables)
            .await
            .with_context(|| format!("Mech query failed for {agent} ({})", self.gql.endpoint()))?;
        let parsed: SenderData =
            serde_json::from_value(data).context("Failed to parse mech sender response")?;

        // An agent that never sent a request has no sender entity
        Ok(parsed.sender.map(|s| s.requests).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Cached source
// ---------------------------------------------------------------------------

/// Cached, fully paginated mech requests per agent.
pub struct MechRequestSource {
    source_name: String,
    api: Box<dyn MechRequestApi>,
    page_size: usize,
    ttl_secs: i64,
}

impl MechRequestSource {
    pub fn new(
        source_name: &str,
        api: Box<dyn MechRequestApi>,
        page_size: usize,
        ttl_secs: i64,
    ) -> Self {
        Self {
            source_name: source_name.to_string(),
            api,
            page_size: page_size.max(1),
            ttl_secs,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Mech requests sent by `agent` after `since`, served from the cache
    /// when possible.
    ///
    /// A failed fetch leaves any existing entry untouched.
    pub async fn fetch_for_agent(
        &self,
        cache: &mut dyn CacheStore,
        agent: &str,
        since: i64,
        now: i64,
    ) -> Result<Vec<MechRequest>> {
        let key = mech_key(&self.source_name, agent);

        if let Some(entry) = cache.get(&key) {
            if !needs_refresh(entry, since, now, self.ttl_secs) {
                if let Some(requests) = entry.as_requests() {
                    debug!(
                        agent,
                        count = requests.len(),
                        age = %age_label(entry.fetched_at, now),
                        "Mech requests served from cache"
                    );
                    return Ok(requests.to_vec());
                }
            }
        }

        let requests = self.fetch_all(agent, since).await?;
        cache.put(key, CacheEntry::requests(now, since, requests.clone()));
        Ok(requests)
    }

    async fn fetch_all(&self, agent: &str, since: i64) -> Result<Vec<MechRequest>> {
        let mut all = Vec::new();
        let mut skip = 0usize;

        loop {
            let batch = self.api.fetch_page(agent, since, skip, self.page_size).await?;
            let len = batch.len();
            all.extend(batch);

            if len < self.page_size {
                break;
            }
            skip += self.page_size;
        }

        info!(agent, since, count = all.len(), "Mech requests fetched");
        Ok(all)
    }
}

/// Whether a cached entry must be re-fetched to serve `since`.
pub fn needs_refresh(entry: &CacheEntry, since: i64, now: i64, ttl_secs: i64) -> bool {
    !entry.covers(since) || !entry.is_fresh(now, ttl_secs) || entry.as_requests().is_none()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

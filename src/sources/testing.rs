//! Scripted GraphQL transport for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::subgraph::GraphQl;
use crate::types::SubgraphError;

/// Replays queued `data` objects in order and records every call.
#[derive(Default)]
pub struct ScriptedGraphQl {
    responses: Mutex<VecDeque<Result<Value, SubgraphError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedGraphQl {
    pub fn new(pages: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(pages.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, err: SubgraphError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    /// Variables of every call made so far.
    pub fn variables(&self) -> Vec<Value> {
        self.calls.lock().unwrap().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GraphQl for ScriptedGraphQl {
    async fn query(&self, query: &str, variables: Value) -> Result<Value, SubgraphError> {
        self.calls.lock().unwrap().push((query.to_string(), variables));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SubgraphError::GraphQl("script exhausted".into())))
    }

    fn endpoint(&self) -> &str {
        "scripted://"
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use evoforge_core::error::{ForgeError, Result};
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{ChatMessage, ModelRequest, TokenId};

use crate::graph::Graph;
use crate::prompt::routing_prompt;
use crate::state::NodeState;

/// Picks a branch condition when the node that just ran did not produce one.
pub trait RoutingFallback: Send + Sync + 'static {
    /// Return one of `conditions`, or `None` if no decision could be made.
    fn route(
        &self,
        last_message: String,
        conditions: Vec<String>,
        token: TokenId,
    ) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Deterministic fallback: the single condition mentioned in the message.
///
/// Matching is case-insensitive substring search. Zero or several hits
/// yield `None`.
#[derive(Debug, Clone, Default)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn pick(message: &str, conditions: &[String]) -> Option<String> {
        let lowered = message.to_lowercase();
        let mut hits = conditions
            .iter()
            .filter(|c| lowered.contains(&c.to_lowercase()));
        match (hits.next(), hits.next()) {
            (Some(c), None) => Some(c.clone()),
            _ => None,
        }
    }
}

impl RoutingFallback for KeywordRouter {
    fn route(
        &self,
        last_message: String,
        conditions: Vec<String>,
        _token: TokenId,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(Self::pick(&last_message, &conditions)) })
    }
}

/// Fallback that asks a model to name the condition.
pub struct ModelRouter {
    client: Arc<dyn ModelClient>,
}

impl ModelRouter {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }
}

impl RoutingFallback for ModelRouter {
    fn route(
        &self,
        last_message: String,
        conditions: Vec<String>,
        token: TokenId,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let request = ModelRequest::new(
                token,
                vec![ChatMessage::user(routing_prompt(&last_message, &conditions))],
            );
            let response = self.client.complete(request).await?;
            let answer = response.text.trim().trim_matches(|c| c == '"' || c == '.');
            let exact = conditions
                .iter()
                .find(|c| c.eq_ignore_ascii_case(answer))
                .cloned();
            Ok(exact.or_else(|| KeywordRouter::pick(answer, &conditions)))
        })
    }
}

/// Resolve the node to run after `node_id`.
///
/// A single outgoing edge is taken regardless of conditions. Otherwise the
/// condition on `state` selects the edge; when absent, `fallback` is asked up
/// to `attempts` times. An unmatched condition is a fatal routing error.
pub async fn next_node(
    graph: &Graph,
    node_id: &str,
    state: &NodeState,
    fallback: &dyn RoutingFallback,
    token: TokenId,
    attempts: u32,
) -> Result<Option<String>> {
    let outgoing = graph.outgoing(node_id);
    match outgoing.as_slice() {
        [] => return Ok(None),
        [only] if !only.is_conditional() => return Ok(Some(only.to.clone())),
        _ => {}
    }

    let find = |condition: &str| {
        outgoing
            .iter()
            .find(|e| e.condition.as_deref() == Some(condition))
            .map(|e| e.to.clone())
    };

    if let Some(condition) = state.condition.as_deref() {
        return find(condition).map(Some).ok_or_else(|| ForgeError::Routing {
            node: node_id.to_string(),
            condition: condition.to_string(),
        });
    }

    let conditions: Vec<String> = outgoing
        .iter()
        .filter_map(|e| e.condition.clone())
        .collect();
    let message = state.last_message().unwrap_or_default().to_string();
    let mut last_candidate = None;
    for attempt in 1..=attempts.max(1) {
        match fallback
            .route(message.clone(), conditions.clone(), token)
            .await?
        {
            Some(candidate) => {
                if let Some(to) = find(&candidate) {
                    debug!(node_id, condition = %candidate, attempt, "Routing fallback chose branch");
                    return Ok(Some(to));
                }
                warn!(node_id, condition = %candidate, attempt, "Routing fallback returned unknown condition");
                last_candidate = Some(candidate);
            }
            None => {
                debug!(node_id, attempt, "Routing fallback found no condition");
            }
        }
    }

    Err(match last_candidate {
        Some(condition) => ForgeError::Routing {
            node: node_id.to_string(),
            condition,
        },
        None => ForgeError::NoCondition {
            node: node_id.to_string(),
        },
    })
}

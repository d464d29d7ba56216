use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use evoforge_core::config::EngineConfig;
use evoforge_core::error::{ForgeError, Result};
use evoforge_core::traits::ModelClient;
use evoforge_core::types::TokenId;

use crate::graph::Graph;
use crate::node::{NodeContext, NodeKind};
use crate::router::{next_node, RoutingFallback};
use crate::state::NodeState;

/// Result of walking a graph from start to end.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final state after the end node.
    pub state: NodeState,
    /// Node ids in execution order.
    pub path: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunOutput {
    /// The last model reply, which is the run's answer.
    pub fn answer(&self) -> Option<&str> {
        self.state.last_message()
    }
}

/// Walks a validated graph, invoking nodes and routing between them.
pub struct GraphEngine {
    model: Arc<dyn ModelClient>,
    router: Arc<dyn RoutingFallback>,
    config: EngineConfig,
}

impl GraphEngine {
    pub fn new(
        model: Arc<dyn ModelClient>,
        router: Arc<dyn RoutingFallback>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            router,
            config,
        }
    }

    /// Run `graph` on `input`, billing every model call to `token`.
    ///
    /// Fails on the first node or routing error, or when the walk exceeds
    /// the configured step limit.
    pub async fn run(
        &self,
        graph: &Graph,
        input: serde_json::Value,
        token: TokenId,
    ) -> Result<RunOutput> {
        let start = Instant::now();
        let ctx = NodeContext {
            graph,
            model: self.model.as_ref(),
            router: self.router.as_ref(),
            token,
        };
        let mut state = NodeState::new(input);
        let mut path = Vec::new();
        let mut current = graph.start_node().id.clone();

        loop {
            if path.len() >= self.config.max_steps {
                return Err(ForgeError::StepLimit(self.config.max_steps));
            }
            let node = graph
                .node(&current)
                .ok_or_else(|| ForgeError::NodeNotFound(current.clone()))?;

            debug!(node_id = %node.id, node_type = node.tag().as_str(), "Invoking node");
            state = node.invoke(state, &ctx).await?;
            path.push(node.id.clone());

            if matches!(node.kind, NodeKind::End) {
                break;
            }

            match next_node(
                graph,
                &node.id,
                &state,
                self.router.as_ref(),
                token,
                self.config.routing_attempts,
            )
            .await?
            {
                Some(next) => current = next,
                None => break,
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(steps = path.len(), elapsed_ms, "Graph run complete");
        Ok(RunOutput {
            state,
            path,
            elapsed_ms,
        })
    }
}

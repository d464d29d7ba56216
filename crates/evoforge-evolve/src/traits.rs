use futures::future::BoxFuture;

use evoforge_core::error::Result;
use evoforge_core::types::{AgentId, TokenId};
use evoforge_graph::ValidationError;

use crate::agent::{Agent, Blueprint};

/// The problem being solved. Scores agents.
pub trait Forge: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Problem statement handed to architects and genetic operators.
    fn description(&self) -> &str;

    /// Run `agent` on the forge's evaluation set and return its fitness.
    /// Every model call made for the evaluation is billed to `token`.
    fn compute_fitness<'a>(
        &'a self,
        agent: &'a Agent,
        token: TokenId,
        generation: u32,
    ) -> BoxFuture<'a, Result<(AgentId, f64)>>;
}

/// Input for designing an agent from scratch.
#[derive(Debug, Clone)]
pub struct ArchitectRequest {
    pub forge_description: String,
    pub node_types: Vec<String>,
    /// Validation errors of a rejected previous attempt.
    pub feedback: Vec<ValidationError>,
}

#[derive(Debug, Clone)]
pub struct CrossoverRequest {
    pub forge_description: String,
    pub node_types: Vec<String>,
    pub parent: Agent,
    pub partner: Agent,
}

#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub forge_description: String,
    pub node_types: Vec<String>,
    pub parent: Agent,
}

/// Designs a new agent for a problem.
pub trait ArchitectOperator: Send + Sync + 'static {
    fn id(&self) -> &AgentId;

    fn architect(&self, request: ArchitectRequest, token: TokenId)
        -> BoxFuture<'_, Result<Blueprint>>;
}

/// Combines two parent agents into one offspring.
pub trait CrossoverOperator: Send + Sync + 'static {
    fn id(&self) -> &AgentId;

    fn crossover(&self, request: CrossoverRequest, token: TokenId)
        -> BoxFuture<'_, Result<Blueprint>>;
}

/// Derives one offspring from a single parent.
pub trait MutationOperator: Send + Sync + 'static {
    fn id(&self) -> &AgentId;

    fn mutate(&self, request: MutationRequest, token: TokenId) -> BoxFuture<'_, Result<Blueprint>>;
}

/// Source of existing agents relevant to a forge.
pub trait Ecosystem: Send + Sync + 'static {
    fn select_agents(&self, forge: String, count: usize) -> BoxFuture<'_, Result<Vec<Agent>>>;
}

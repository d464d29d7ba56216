use serde::{Deserialize, Serialize};

use evoforge_core::error::Result;
use evoforge_core::types::{AgentId, TokenId};
use evoforge_graph::{validate, Graph, GraphEngine, RawGraph, RunOutput, ValidationErrors};

/// Where an agent came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub parent_ids: Vec<AgentId>,
    #[serde(default)]
    pub architect_agent_id: Option<AgentId>,
    #[serde(default)]
    pub genetic_operator_agent_id: Option<AgentId>,
}

impl Provenance {
    pub fn architected(architect: AgentId) -> Self {
        Self {
            architect_agent_id: Some(architect),
            ..Default::default()
        }
    }

    pub fn bred(parents: Vec<AgentId>, operator: AgentId) -> Self {
        Self {
            parent_ids: parents,
            genetic_operator_agent_id: Some(operator),
            ..Default::default()
        }
    }
}

/// What an operator produces: an agent before its graph is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub graph: RawGraph,
}

/// An agent: a named, validated workflow graph plus its lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Description embedding, supplied by the ecosystem when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub graph: Graph,
    #[serde(default)]
    pub provenance: Provenance,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        graph: Graph,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            description: description.into(),
            embedding: None,
            graph,
            provenance,
        }
    }

    /// Validate a blueprint's graph and mint a fresh agent from it.
    pub fn from_blueprint(
        blueprint: Blueprint,
        provenance: Provenance,
    ) -> std::result::Result<Self, ValidationErrors> {
        let graph = validate(blueprint.graph)?;
        Ok(Self::new(
            blueprint.name,
            blueprint.description,
            graph,
            provenance,
        ))
    }

    /// Run the agent's graph on `input`, billing model calls to `token`.
    pub async fn run(
        &self,
        engine: &GraphEngine,
        input: serde_json::Value,
        token: TokenId,
    ) -> Result<RunOutput> {
        engine.run(&self.graph, input, token).await
    }
}

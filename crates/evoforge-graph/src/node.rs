use serde::{Deserialize, Serialize};
use tracing::debug;

use evoforge_core::error::Result;
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{ChatMessage, ModelRequest, TokenId};

use crate::graph::Graph;
use crate::prompt;
use crate::router::{KeywordRouter, RoutingFallback};
use crate::state::NodeState;

pub const START_NODE_ID: &str = "start_node";
pub const END_NODE_ID: &str = "end_node";

/// Discriminant of the closed set of node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Start,
    End,
    Llm,
    Routing,
    RegexRouting,
    Validator,
}

/// Type-tag lookup table used when decoding raw graphs.
pub const NODE_TYPES: [(&str, NodeTag); 6] = [
    ("StartNode", NodeTag::Start),
    ("EndNode", NodeTag::End),
    ("LLMNode", NodeTag::Llm),
    ("RoutingNode", NodeTag::Routing),
    ("RegexRoutingNode", NodeTag::RegexRouting),
    ("ValidatorNode", NodeTag::Validator),
];

impl NodeTag {
    pub fn lookup(tag: &str) -> Option<NodeTag> {
        NODE_TYPES
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, t)| *t)
    }

    pub fn as_str(self) -> &'static str {
        NODE_TYPES
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(name, _)| *name)
            .unwrap_or("Unknown")
    }
}

/// Variant-specific node data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    #[serde(rename = "StartNode")]
    Start,
    #[serde(rename = "EndNode")]
    End,
    /// Calls the model with the node prompt.
    #[serde(rename = "LLMNode")]
    Llm {
        purpose: String,
        prompt: String,
        #[serde(default)]
        temperature: f32,
        /// JSON schemas of tools exposed to the model.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools: Vec<serde_json::Value>,
    },
    /// Asks the routing fallback to name the next branch.
    #[serde(rename = "RoutingNode")]
    Routing,
    /// Scans the last message for exactly one branch condition.
    #[serde(rename = "RegexRoutingNode")]
    RegexRouting,
    /// Parses the last message as JSON and checks required keys.
    #[serde(rename = "ValidatorNode")]
    Validator {
        #[serde(default)]
        required_keys: Vec<String>,
    },
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Collaborators a node needs while it runs.
pub struct NodeContext<'a> {
    pub graph: &'a Graph,
    pub model: &'a dyn ModelClient,
    pub router: &'a dyn RoutingFallback,
    pub token: TokenId,
}

impl Node {
    pub fn start() -> Self {
        Self {
            id: START_NODE_ID.into(),
            name: START_NODE_ID.into(),
            kind: NodeKind::Start,
        }
    }

    pub fn end() -> Self {
        Self {
            id: END_NODE_ID.into(),
            name: END_NODE_ID.into(),
            kind: NodeKind::End,
        }
    }

    pub fn llm(
        id: impl Into<String>,
        purpose: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: NodeKind::Llm {
                purpose: purpose.into(),
                prompt: prompt.into(),
                temperature: 0.0,
                tools: Vec::new(),
            },
        }
    }

    pub fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
        }
    }

    pub fn tag(&self) -> NodeTag {
        match self.kind {
            NodeKind::Start => NodeTag::Start,
            NodeKind::End => NodeTag::End,
            NodeKind::Llm { .. } => NodeTag::Llm,
            NodeKind::Routing => NodeTag::Routing,
            NodeKind::RegexRouting => NodeTag::RegexRouting,
            NodeKind::Validator { .. } => NodeTag::Validator,
        }
    }

    /// Run this node against `state`, returning the updated state.
    pub async fn invoke(&self, mut state: NodeState, ctx: &NodeContext<'_>) -> Result<NodeState> {
        state.condition = None;
        match &self.kind {
            NodeKind::Start | NodeKind::End => Ok(state),
            NodeKind::Llm {
                prompt: node_prompt,
                temperature,
                tools,
                ..
            } => {
                let conditions = ctx.graph.conditions(&self.id);
                let system = prompt::system_prompt(
                    ctx.graph.shared_context_prompt(),
                    &state.input,
                    &self.name,
                );
                let user = prompt::user_prompt(
                    node_prompt,
                    &state.input,
                    state.error_message.as_deref(),
                    &conditions,
                );

                let mut messages = vec![ChatMessage::system(system)];
                messages.extend(state.messages.iter().cloned());
                messages.push(ChatMessage::user(user.clone()));

                let request = ModelRequest::new(ctx.token, messages)
                    .with_temperature(*temperature)
                    .with_tools(tools.clone());
                let response = ctx.model.complete(request).await?;
                debug!(node_id = %self.id, chars = response.text.len(), "Model node replied");

                state.messages.push(ChatMessage::user(user));
                state.messages.push(ChatMessage::assistant(response.text));
                state.error_message = None;
                Ok(state)
            }
            NodeKind::RegexRouting => {
                let conditions: Vec<String> = ctx
                    .graph
                    .conditions(&self.id)
                    .into_iter()
                    .map(String::from)
                    .collect();
                state.condition = state
                    .last_message()
                    .and_then(|msg| KeywordRouter::pick(msg, &conditions));
                if state.condition.is_none() {
                    state.error_message = Some(format!(
                        "Expected exactly one of the conditions {} in the response.",
                        conditions.join(", ")
                    ));
                }
                Ok(state)
            }
            NodeKind::Routing => {
                let conditions: Vec<String> = ctx
                    .graph
                    .conditions(&self.id)
                    .into_iter()
                    .map(String::from)
                    .collect();
                let message = state.last_message().unwrap_or_default().to_string();
                state.condition = ctx.router.route(message, conditions, ctx.token).await?;
                Ok(state)
            }
            NodeKind::Validator { required_keys } => {
                let text = state.last_message().unwrap_or_default();
                match check_json(text, required_keys) {
                    Ok(value) => {
                        state.output = Some(value);
                        state.error_message = None;
                        state.condition = Some("valid".into());
                    }
                    Err(reason) => {
                        debug!(node_id = %self.id, %reason, "Validation failed");
                        state.error_message = Some(reason);
                        state.condition = Some("invalid".into());
                    }
                }
                Ok(state)
            }
        }
    }
}

fn check_json(text: &str, required_keys: &[String]) -> std::result::Result<serde_json::Value, String> {
    let value: serde_json::Value = serde_json::from_str(prompt::extract_json(text))
        .map_err(|e| format!("Response is not valid JSON: {}", e))?;
    let missing: Vec<&str> = required_keys
        .iter()
        .filter(|k| value.get(k.as_str()).is_none())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(value)
    } else {
        Err(format!("Missing required keys: {}", missing.join(", ")))
    }
}

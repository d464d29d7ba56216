use serde::{Deserialize, Serialize};

use evoforge_core::types::{ChatMessage, Role};

/// State threaded through the nodes of a single graph run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeState {
    /// The run's input, used to fill prompt placeholders.
    pub input: serde_json::Value,
    /// Conversation so far (user prompts and model replies).
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Condition produced by the node that just ran, consumed by routing.
    #[serde(default)]
    pub condition: Option<String>,
    /// Error the next model node is asked to fix.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Structured output captured by a validator node.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
}

impl NodeState {
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            input,
            ..Default::default()
        }
    }

    /// Content of the most recent model reply, falling back to the last message.
    pub fn last_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .or_else(|| self.messages.last())
            .map(|m| m.content.as_str())
    }
}

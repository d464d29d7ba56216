use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a budget token (master or child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub Uuid);

impl TokenId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an agent in a population.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(format!("agent-{}", Uuid::new_v4()))
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which level of the token hierarchy a budget error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    Child,
    Master,
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetScope::Child => write!(f, "child"),
            BudgetScope::Master => write!(f, "master"),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A single completion request. Every request is billed against `token`.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub token: TokenId,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// JSON schemas of tools the model may call.
    pub tools: Vec<serde_json::Value>,
}

impl ModelRequest {
    pub fn new(token: TokenId, messages: Vec<ChatMessage>) -> Self {
        Self {
            token,
            messages,
            temperature: 0.0,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    #[serde(default)]
    pub usage: Usage,
    /// Provider-reported cost in dollars.
    #[serde(default)]
    pub cost: f64,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
            cost: 0.0,
        }
    }
}

/// Lifecycle events emitted by a forge cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ForgeEvent {
    CycleStarted {
        forge: String,
        budget: Option<f64>,
        population_size: usize,
        at: DateTime<Utc>,
    },
    PopulationInitialized {
        from_ecosystem: usize,
        from_architect: usize,
    },
    GenerationStarted {
        generation: u32,
        population: usize,
    },
    AgentEvaluated {
        generation: u32,
        agent_id: AgentId,
        fitness: f64,
        cost: f64,
    },
    OffspringCreated {
        generation: u32,
        agent_id: AgentId,
        parent_ids: Vec<AgentId>,
        operator: AgentId,
    },
    GenerationCompleted {
        generation: u32,
        cost: f64,
        best_fitness: Option<f64>,
    },
    CycleEnded {
        generations: u32,
        total_cost: f64,
        at: DateTime<Utc>,
    },
    CycleFailed {
        generation: u32,
        error: String,
    },
}

use thiserror::Error;

use crate::types::{BudgetScope, TokenId};

#[derive(Debug, Error)]
pub enum ForgeError {
    // Model errors
    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model request timed out after {0}s")]
    ModelTimeout(u64),

    #[error("Model provider rate limit: {0}")]
    RateLimited(String),

    #[error("Model response parse error: {0}")]
    ModelParse(String),

    // Budget errors
    #[error("Budget exceeded on {scope} token: spent {total:.4} of {limit:.4}")]
    BudgetExceeded {
        scope: BudgetScope,
        limit: f64,
        total: f64,
    },

    #[error("Unknown budget token: {0}")]
    UnknownToken(TokenId),

    #[error("Master token has already been acquired")]
    MasterAlreadyAcquired,

    #[error("Master token has not been acquired")]
    MasterNotAcquired,

    #[error("Master token mismatch: {0}")]
    MasterMismatch(TokenId),

    #[error("Master token has been released")]
    MasterReleased,

    #[error("Invalid spend amount: {0}")]
    InvalidSpend(f64),

    #[error("Budget ledger lock poisoned")]
    LockPoisoned,

    // Graph errors
    #[error("Node '{0}' not found in graph")]
    NodeNotFound(String),

    #[error("No edge found from node '{node}' with the condition '{condition}'")]
    Routing { node: String, condition: String },

    #[error("No condition found for node '{node}'")]
    NoCondition { node: String },

    #[error("Graph run exceeded {0} steps")]
    StepLimit(usize),

    // Evolution errors
    #[error("Operator {operator} failed: {message}")]
    Operator { operator: String, message: String },

    #[error("Fitness evaluation failed: {0}")]
    Evaluation(String),

    #[error("Forge cycle cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForgeError {
    /// Whether this error is the budget stop-signal for a token lineage.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, ForgeError::BudgetExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ForgeError, Result};

/// Top-level evoforge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Parameters of the evolutionary loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Target population size `N`.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of agents requested from the ecosystem at initialization.
    #[serde(default = "default_ecosystem_seed_count")]
    pub ecosystem_seed_count: usize,
    /// Number of agents returned at the end of the cycle.
    #[serde(default = "default_n_best")]
    pub n_best: usize,
    /// Share of the population replaced by offspring each generation.
    #[serde(default = "default_replacement_ratio")]
    pub replacement_ratio: f64,
    /// Tournament size as a share of the live population.
    #[serde(default = "default_tournament_size_ratio")]
    pub tournament_size_ratio: f64,
    /// Share of the total budget for initialization architects, split evenly
    /// across the missing slots.
    #[serde(default = "default_operator_budget_ratio")]
    pub architect_budget_ratio: f64,
    /// Share of the total budget for one generation's crossover and mutation
    /// batch, shared by every task in it.
    #[serde(default = "default_operator_budget_ratio")]
    pub genetic_operator_budget_ratio: f64,
    /// Node type tags operators are allowed to use.
    #[serde(default = "default_node_types")]
    pub node_types: Vec<String>,
    #[serde(default)]
    pub termination: Termination,
    /// Write per-generation population snapshots under this directory.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    /// Seed for selection randomness. Unset means entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            ecosystem_seed_count: default_ecosystem_seed_count(),
            n_best: default_n_best(),
            replacement_ratio: default_replacement_ratio(),
            tournament_size_ratio: default_tournament_size_ratio(),
            architect_budget_ratio: default_operator_budget_ratio(),
            genetic_operator_budget_ratio: default_operator_budget_ratio(),
            node_types: default_node_types(),
            termination: Termination::default(),
            snapshot_dir: None,
            seed: None,
        }
    }
}

fn default_population_size() -> usize { 10 }
fn default_ecosystem_seed_count() -> usize { 5 }
fn default_n_best() -> usize { 3 }
fn default_replacement_ratio() -> f64 { 0.5 }
fn default_tournament_size_ratio() -> f64 { 0.1 }
fn default_operator_budget_ratio() -> f64 { 1.0 }
fn default_node_types() -> Vec<String> {
    vec!["StartNode".into(), "EndNode".into(), "LLMNode".into()]
}

/// When the cycle stops producing new generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Termination {
    /// Run while the remaining budget covers another generation.
    Budget {
        budget: f64,
        #[serde(default)]
        max_generations: Option<u32>,
    },
    /// Run a fixed number of generations, optionally under a budget ceiling.
    Generations {
        generations: u32,
        #[serde(default)]
        budget: Option<f64>,
    },
}

impl Default for Termination {
    fn default() -> Self {
        Termination::Budget {
            budget: 1.0,
            max_generations: None,
        }
    }
}

impl Termination {
    /// Dollar ceiling for the master token, if any.
    pub fn budget(&self) -> Option<f64> {
        match self {
            Termination::Budget { budget, .. } => Some(*budget),
            Termination::Generations { budget, .. } => *budget,
        }
    }
}

/// Sliding-window admission control for outbound model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
        }
    }
}

fn default_calls_per_minute() -> usize { 500 }

/// Retry configuration for model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Per-attempt timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_max_retries() -> u32 { 10 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 60000 }
fn default_request_timeout() -> u64 { 120 }

/// Limits for walking an agent's workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum node invocations per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// How many times the routing fallback is asked before giving up.
    #[serde(default = "default_routing_attempts")]
    pub routing_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            routing_attempts: default_routing_attempts(),
        }
    }
}

fn default_max_steps() -> usize { 50 }
fn default_routing_attempts() -> u32 { 3 }

impl ForgeConfig {
    /// Load config from a TOML file, expanding `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ForgeError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ForgeError::Config(e.to_string()))?;
        config.validate()?;
        debug!(
            path = %path.display(),
            population_size = config.cycle.population_size,
            budget = ?config.cycle.termination.budget(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Reject values the cycle cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.cycle;
        if c.population_size == 0 {
            return Err(ForgeError::Config("cycle.population_size must be at least 1".into()));
        }
        for (name, value) in [
            ("replacement_ratio", c.replacement_ratio),
            ("tournament_size_ratio", c.tournament_size_ratio),
            ("architect_budget_ratio", c.architect_budget_ratio),
            ("genetic_operator_budget_ratio", c.genetic_operator_budget_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ForgeError::Config(format!(
                    "cycle.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        match &c.termination {
            Termination::Budget { budget, .. } if !(budget.is_finite() && *budget > 0.0) => {
                return Err(ForgeError::Config(format!(
                    "cycle.termination.budget must be positive, got {}",
                    budget
                )));
            }
            Termination::Generations { generations: 0, .. } => {
                return Err(ForgeError::Config(
                    "cycle.termination.generations must be at least 1".into(),
                ));
            }
            Termination::Generations {
                budget: Some(budget),
                ..
            } if !(budget.is_finite() && *budget > 0.0) => {
                return Err(ForgeError::Config(format!(
                    "cycle.termination.budget must be positive, got {}",
                    budget
                )));
            }
            _ => {}
        }
        if self.gate.calls_per_minute == 0 {
            return Err(ForgeError::Config("gate.calls_per_minute must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    warn!(var = %var_name, "Config references unset environment variable");
                    result.push_str("${");
                    result.push_str(&var_name);
                    result.push('}');
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use evoforge_budget::BudgetManager;
use evoforge_core::error::{ForgeError, Result};
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{AgentId, ModelRequest, ModelResponse, TokenId};
use evoforge_evolve::{
    Agent, ArchitectOperator, ArchitectRequest, Blueprint, CrossoverOperator, CrossoverRequest,
    Ecosystem, Forge, MutationOperator, MutationRequest,
};

use crate::fixtures::{broken_raw_graph, linear_raw_graph};

/// Bill `cost` the way a metered client would: refuse on an exhausted token,
/// otherwise commit the spend.
fn charge(budget: &Option<Arc<BudgetManager>>, token: TokenId, cost: f64) -> Result<()> {
    match budget {
        Some(budget) if cost > 0.0 => {
            budget.check(token)?;
            budget.record_spend(token, cost)
        }
        _ => Ok(()),
    }
}

/// Model that replays scripted replies, each with a fixed cost.
pub struct MockModel {
    replies: Mutex<VecDeque<String>>,
    cost: f64,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl MockModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            cost: 0.0,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ModelClient for MockModel {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        let cost = self.cost;
        Box::pin(async move {
            let text = reply.ok_or_else(|| ForgeError::ModelRequest("mock script exhausted".into()))?;
            Ok(ModelResponse {
                cost,
                ..ModelResponse::text(text)
            })
        })
    }
}

/// Forge scoring agents by name from a fixed table, charging a fixed cost
/// per evaluation.
pub struct MockForge {
    fitness: HashMap<String, f64>,
    default_fitness: f64,
    cost_per_eval: f64,
    budget: Option<Arc<BudgetManager>>,
    failing: HashSet<String>,
    pub evaluations: AtomicUsize,
}

impl MockForge {
    pub fn new(fitness: &[(&str, f64)]) -> Self {
        Self {
            fitness: fitness.iter().map(|(n, f)| (n.to_string(), *f)).collect(),
            default_fitness: 0.5,
            cost_per_eval: 0.0,
            budget: None,
            failing: HashSet::new(),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn with_default_fitness(mut self, fitness: f64) -> Self {
        self.default_fitness = fitness;
        self
    }

    pub fn with_cost(mut self, cost: f64, budget: Arc<BudgetManager>) -> Self {
        self.cost_per_eval = cost;
        self.budget = Some(budget);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl Forge for MockForge {
    fn name(&self) -> &str {
        "mock-forge"
    }

    fn description(&self) -> &str {
        "Answer arithmetic questions."
    }

    fn compute_fitness<'a>(
        &'a self,
        agent: &'a Agent,
        token: TokenId,
        _generation: u32,
    ) -> BoxFuture<'a, Result<(AgentId, f64)>> {
        Box::pin(async move {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            charge(&self.budget, token, self.cost_per_eval)?;
            if self.failing.contains(&agent.name) {
                return Err(ForgeError::Evaluation(format!("{} crashed", agent.name)));
            }
            let fitness = self
                .fitness
                .get(&agent.name)
                .copied()
                .unwrap_or(self.default_fitness);
            Ok((agent.id.clone(), fitness))
        })
    }
}

/// Architect producing `architect-<n>` agents. The first `invalid_first`
/// calls return graphs that fail validation.
pub struct MockArchitect {
    id: AgentId,
    cost: f64,
    budget: Option<Arc<BudgetManager>>,
    invalid_first: usize,
    always_fail: bool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ArchitectRequest>>,
}

impl MockArchitect {
    pub fn new() -> Self {
        Self {
            id: AgentId::from_str("mock-architect"),
            cost: 0.0,
            budget: None,
            invalid_first: 0,
            always_fail: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cost(mut self, cost: f64, budget: Arc<BudgetManager>) -> Self {
        self.cost = cost;
        self.budget = Some(budget);
        self
    }

    pub fn invalid_first(mut self, n: usize) -> Self {
        self.invalid_first = n;
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }
}

impl Default for MockArchitect {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchitectOperator for MockArchitect {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn architect(
        &self,
        request: ArchitectRequest,
        token: TokenId,
    ) -> BoxFuture<'_, Result<Blueprint>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        Box::pin(async move {
            charge(&self.budget, token, self.cost)?;
            if self.always_fail {
                return Err(ForgeError::Operator {
                    operator: self.id.to_string(),
                    message: "architect unavailable".into(),
                });
            }
            let graph = if n < self.invalid_first {
                broken_raw_graph()
            } else {
                linear_raw_graph("solve")
            };
            Ok(Blueprint {
                name: format!("architect-{}", n),
                description: "designed from scratch".into(),
                graph,
            })
        })
    }
}

/// Crossover naming offspring `<parent>x<partner>`.
pub struct MockCrossover {
    id: AgentId,
    cost: f64,
    budget: Option<Arc<BudgetManager>>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl MockCrossover {
    pub fn new() -> Self {
        Self {
            id: AgentId::from_str("mock-crossover"),
            cost: 0.0,
            budget: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cost(mut self, cost: f64, budget: Arc<BudgetManager>) -> Self {
        self.cost = cost;
        self.budget = Some(budget);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Default for MockCrossover {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossoverOperator for MockCrossover {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn crossover(
        &self,
        request: CrossoverRequest,
        token: TokenId,
    ) -> BoxFuture<'_, Result<Blueprint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            charge(&self.budget, token, self.cost)?;
            if self.fail {
                return Err(ForgeError::Operator {
                    operator: self.id.to_string(),
                    message: "crossover failed".into(),
                });
            }
            Ok(Blueprint {
                name: format!("{}x{}", request.parent.name, request.partner.name),
                description: "crossover offspring".into(),
                graph: request.parent.graph.to_raw(),
            })
        })
    }
}

/// Mutation naming offspring `<parent>'`.
pub struct MockMutation {
    id: AgentId,
    cost: f64,
    budget: Option<Arc<BudgetManager>>,
    pub calls: AtomicUsize,
}

impl MockMutation {
    pub fn new() -> Self {
        Self {
            id: AgentId::from_str("mock-mutation"),
            cost: 0.0,
            budget: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cost(mut self, cost: f64, budget: Arc<BudgetManager>) -> Self {
        self.cost = cost;
        self.budget = Some(budget);
        self
    }
}

impl Default for MockMutation {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationOperator for MockMutation {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn mutate(&self, request: MutationRequest, token: TokenId) -> BoxFuture<'_, Result<Blueprint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            charge(&self.budget, token, self.cost)?;
            Ok(Blueprint {
                name: format!("{}'", request.parent.name),
                description: "mutated offspring".into(),
                graph: request.parent.graph.to_raw(),
            })
        })
    }
}

/// Ecosystem handing out a fixed list of agents.
pub struct MockEcosystem {
    agents: Vec<Agent>,
    pub requests: Mutex<Vec<(String, usize)>>,
}

impl MockEcosystem {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Ecosystem for MockEcosystem {
    fn select_agents(&self, forge: String, count: usize) -> BoxFuture<'_, Result<Vec<Agent>>> {
        self.requests.lock().unwrap().push((forge, count));
        let agents = self.agents.iter().take(count).cloned().collect();
        Box::pin(async move { Ok(agents) })
    }
}

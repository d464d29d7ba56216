use std::collections::{BTreeMap, HashSet};

use evoforge_core::types::AgentId;

use crate::agent::Agent;

/// The live agents of a cycle and what is known about them.
#[derive(Debug, Clone, Default)]
pub struct Population {
    generation: u32,
    agents: BTreeMap<AgentId, Agent>,
    fitness: BTreeMap<AgentId, f64>,
    /// Evaluation cost of each agent in the first generation.
    first_generation_costs: BTreeMap<AgentId, f64>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u32) {
        self.generation = generation;
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn insert(&mut self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().cloned().collect()
    }

    pub fn fitness(&self, id: &AgentId) -> Option<f64> {
        self.fitness.get(id).copied()
    }

    pub fn set_fitness(&mut self, id: AgentId, fitness: f64) {
        self.fitness.insert(id, fitness);
    }

    /// Fitness of every live agent, keyed by id.
    pub fn fitness_map(&self) -> BTreeMap<AgentId, f64> {
        self.fitness
            .iter()
            .filter(|(id, _)| self.agents.contains_key(*id))
            .map(|(id, f)| (id.clone(), *f))
            .collect()
    }

    /// Live agents that have not been scored yet.
    pub fn unevaluated(&self) -> Vec<AgentId> {
        self.agents
            .keys()
            .filter(|id| !self.fitness.contains_key(*id))
            .cloned()
            .collect()
    }

    /// `(id, fitness)` for every scored live agent.
    pub fn scored(&self) -> Vec<(AgentId, f64)> {
        self.fitness_map().into_iter().collect()
    }

    /// Scored agents, fittest first. Ties keep id order.
    pub fn ranked(&self) -> Vec<(AgentId, f64)> {
        let mut ranked = self.scored();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// The `n` fittest agents with their fitness.
    pub fn best(&self, n: usize) -> Vec<(Agent, f64)> {
        self.ranked()
            .into_iter()
            .take(n)
            .filter_map(|(id, f)| self.agents.get(&id).map(|a| (a.clone(), f)))
            .collect()
    }

    /// Drop every agent not in `keep`, along with its fitness.
    pub fn retain(&mut self, keep: &HashSet<AgentId>) {
        self.agents.retain(|id, _| keep.contains(id));
        self.fitness.retain(|id, _| keep.contains(id));
    }

    pub fn record_first_generation_cost(&mut self, id: AgentId, cost: f64) {
        self.first_generation_costs.insert(id, cost);
    }

    /// Split `total` across first-generation agents in proportion to their
    /// evaluation cost. Evenly when those costs sum to zero.
    pub fn pro_rate(&self, total: f64) -> BTreeMap<AgentId, f64> {
        let costs = &self.first_generation_costs;
        if costs.is_empty() {
            return BTreeMap::new();
        }
        let sum: f64 = costs.values().sum();
        costs
            .iter()
            .map(|(id, cost)| {
                let share = if sum > 0.0 {
                    cost / sum
                } else {
                    1.0 / costs.len() as f64
                };
                (id.clone(), share * total)
            })
            .collect()
    }
}

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use evoforge_budget::BudgetManager;
use evoforge_core::config::{CycleConfig, Termination};
use evoforge_core::error::{ForgeError, Result};
use evoforge_core::event::EventBus;
use evoforge_core::types::{AgentId, ForgeEvent, TokenId};

use crate::agent::Agent;
use crate::operators::{architect_task, recombine_task, OperatorContext, OperatorSet};
use crate::outcome::TaskOutcome;
use crate::population::Population;
use crate::selection::{pair_parents, roulette_wheel, tournament};
use crate::snapshot::{generation_label, SnapshotWriter, INIT_LABEL};
use crate::traits::{Ecosystem, Forge};

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    Completed,
    /// Initialization produced no agents.
    NoAgents,
    Cancelled,
    /// A generation failed; the result holds the best agents found before it.
    Failed(String),
}

/// Outcome of a forge cycle.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub status: CycleStatus,
    /// Up to `n_best` agents, fittest first.
    pub best: Vec<(Agent, f64)>,
    pub generations: u32,
    /// Master-token spend: the billed cost of the run.
    pub total_cost: f64,
    /// Total cost split across first-generation agents.
    pub agent_costs: BTreeMap<AgentId, f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The evolutionary loop: initialize, then evaluate, select, and recombine
/// each generation until the budget or generation count runs out.
pub struct ForgeCycle {
    config: CycleConfig,
    forge: Arc<dyn Forge>,
    operators: OperatorSet,
    budget: Arc<BudgetManager>,
    ecosystem: Option<Arc<dyn Ecosystem>>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl ForgeCycle {
    pub fn new(
        config: CycleConfig,
        forge: Arc<dyn Forge>,
        operators: OperatorSet,
        budget: Arc<BudgetManager>,
    ) -> Self {
        Self {
            config,
            forge,
            operators,
            budget,
            ecosystem: None,
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_ecosystem(mut self, ecosystem: Arc<dyn Ecosystem>) -> Self {
        self.ecosystem = Some(ecosystem);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Cancellation is checked between generations.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    fn budget_limit(&self) -> f64 {
        self.config.termination.budget().unwrap_or(f64::INFINITY)
    }

    fn operator_context(&self) -> OperatorContext {
        OperatorContext {
            forge_description: self.forge.description().to_string(),
            node_types: self.config.node_types.clone(),
        }
    }

    /// Run the cycle to completion.
    ///
    /// Errors only when the master token cannot be acquired or released.
    /// Failures inside a generation end the cycle with
    /// [`CycleStatus::Failed`] and the best agents found so far.
    pub async fn run(&self) -> Result<CycleResult> {
        let started_at = Utc::now();
        let master = self.budget.acquire_master(self.budget_limit())?;
        info!(
            forge = self.forge.name(),
            population_size = self.config.population_size,
            budget = ?self.config.termination.budget(),
            "Forge cycle started"
        );
        self.events.publish(ForgeEvent::CycleStarted {
            forge: self.forge.name().to_string(),
            budget: self.config.termination.budget(),
            population_size: self.config.population_size,
            at: started_at,
        });

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut population = Population::new();
        let outcome = self.drive(master, &mut population, &mut rng).await;

        let total_cost = self.budget.release_master(master)?;
        let status = match outcome {
            Ok(status) => status,
            Err(ForgeError::Cancelled) => {
                warn!(generation = population.generation(), "Forge cycle cancelled");
                CycleStatus::Cancelled
            }
            Err(e) => {
                error!(generation = population.generation(), error = %e, "Forge cycle failed");
                self.events.publish(ForgeEvent::CycleFailed {
                    generation: population.generation(),
                    error: e.to_string(),
                });
                CycleStatus::Failed(e.to_string())
            }
        };

        let finished_at = Utc::now();
        self.events.publish(ForgeEvent::CycleEnded {
            generations: population.generation(),
            total_cost,
            at: finished_at,
        });
        let best = population.best(self.config.n_best);
        if let Some((agent, fitness)) = best.first() {
            info!(agent_id = %agent.id, fitness, total_cost, "Forge cycle ended");
            debug!("Best agent graph:\n{}", agent.graph.to_mermaid("TD"));
        } else {
            info!(total_cost, "Forge cycle ended without agents");
        }

        Ok(CycleResult {
            status,
            best,
            generations: population.generation(),
            total_cost,
            agent_costs: population.pro_rate(total_cost),
            started_at,
            finished_at,
        })
    }

    async fn drive(
        &self,
        master: TokenId,
        population: &mut Population,
        rng: &mut StdRng,
    ) -> Result<CycleStatus> {
        self.initialize(master, population, rng).await?;
        if population.is_empty() {
            warn!("No agents after initialization, aborting cycle");
            return Ok(CycleStatus::NoAgents);
        }
        self.snapshot(INIT_LABEL, population).await;

        let mut first_generation_cost = None;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ForgeError::Cancelled);
            }
            let generation = population.generation() + 1;
            population.set_generation(generation);
            let cost = self.run_generation(master, generation, population, rng).await?;
            let estimate = *first_generation_cost.get_or_insert(cost);
            if !self.should_continue(generation, estimate) {
                break;
            }
        }

        let pending = population.unevaluated();
        if !pending.is_empty() {
            info!(agents = pending.len(), "Final evaluation of unscored offspring");
            self.evaluate(master, population.generation(), &pending, population, false)
                .await?;
        }
        Ok(CycleStatus::Completed)
    }

    fn should_continue(&self, generation: u32, estimate: f64) -> bool {
        let remaining = self.budget.remaining();
        match &self.config.termination {
            Termination::Budget {
                max_generations, ..
            } => {
                if max_generations.is_some_and(|max| generation >= max) {
                    return false;
                }
                if estimate <= 0.0 && max_generations.is_none() {
                    warn!("First generation cost nothing; stopping rather than looping without bound");
                    return false;
                }
                let go_on = remaining > estimate;
                debug!(remaining, estimate, go_on, "Budget check");
                go_on
            }
            Termination::Generations { generations, budget } => {
                generation < *generations && (budget.is_none() || remaining > 0.0)
            }
        }
    }

    async fn initialize(
        &self,
        master: TokenId,
        population: &mut Population,
        rng: &mut StdRng,
    ) -> Result<()> {
        let target = self.config.population_size;
        let seed_count = self.config.ecosystem_seed_count.min(target);

        let mut from_ecosystem = 0;
        if let (Some(ecosystem), true) = (&self.ecosystem, seed_count > 0) {
            match ecosystem
                .select_agents(self.forge.name().to_string(), seed_count)
                .await
            {
                Ok(agents) => {
                    for agent in agents.into_iter().take(seed_count) {
                        population.insert(agent);
                        from_ecosystem += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Ecosystem selection failed"),
            }
        }

        let missing = target.saturating_sub(population.len());
        // The architect phase allocation is split evenly across the slots.
        let limit = self.config.architect_budget_ratio * self.budget_limit() / missing.max(1) as f64;
        let mut tasks = Vec::with_capacity(missing);
        for _ in 0..missing {
            let Some(architect) = self.operators.pick_architect(rng) else {
                warn!(missing, "No architect configured, population stays short");
                break;
            };
            tasks.push((architect, self.budget.issue_child(limit, master)?));
        }

        let ctx = self.operator_context();
        let outcomes = join_all(
            tasks
                .into_iter()
                .map(|(architect, token)| architect_task(architect, &ctx, token)),
        )
        .await;

        let mut from_architect = 0;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Ok(agent) => {
                    population.insert(agent);
                    from_architect += 1;
                }
                TaskOutcome::BudgetExhausted => warn!("Architect ran out of budget, slot dropped"),
                TaskOutcome::Failed(reason) => warn!(%reason, "Architect failed, slot dropped"),
            }
        }

        info!(from_ecosystem, from_architect, "Population initialized");
        self.events.publish(ForgeEvent::PopulationInitialized {
            from_ecosystem,
            from_architect,
        });
        Ok(())
    }

    /// One generation: evaluate, select survivors and parents, breed.
    /// Returns the master spend incurred.
    async fn run_generation(
        &self,
        master: TokenId,
        generation: u32,
        population: &mut Population,
        rng: &mut StdRng,
    ) -> Result<f64> {
        let spent_before = self.budget.master_spend();
        info!(generation, population = population.len(), "Generation started");
        self.events.publish(ForgeEvent::GenerationStarted {
            generation,
            population: population.len(),
        });

        let ids = population.ids();
        self.evaluate(master, generation, &ids, population, generation == 1)
            .await?;
        self.snapshot(&generation_label(generation), population).await;

        let scored = population.scored();
        let best_fitness = population.ranked().first().map(|(_, f)| *f);
        let size = self.config.population_size;
        let n_replaced =
            ((size as f64 * self.config.replacement_ratio).round() as usize).min(size);
        let n_kept = size - n_replaced;

        let kept: HashSet<AgentId> = roulette_wheel(&scored, n_kept, rng).into_iter().collect();
        let parents = tournament(&scored, n_replaced, self.config.tournament_size_ratio, rng);
        debug!(generation, kept = kept.len(), parents = parents.len(), "Selection done");

        let offspring = self
            .recombine(master, generation, &parents, population, rng)
            .await?;
        population.retain(&kept);
        for child in offspring {
            population.insert(child);
        }

        let cost = self.budget.master_spend() - spent_before;
        info!(generation, cost, best_fitness = ?best_fitness, "Generation completed");
        self.events.publish(ForgeEvent::GenerationCompleted {
            generation,
            cost,
            best_fitness,
        });
        Ok(cost)
    }

    /// Score `ids` concurrently, one child token each. Failed or
    /// budget-starved evaluations score zero.
    async fn evaluate(
        &self,
        master: TokenId,
        generation: u32,
        ids: &[AgentId],
        population: &mut Population,
        record_costs: bool,
    ) -> Result<()> {
        let per_agent = self.budget_limit() / (self.config.population_size.max(1) * 2) as f64;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.push((id.clone(), self.budget.issue_child(per_agent, master)?));
        }

        let results = {
            let population: &Population = population;
            join_all(jobs.into_iter().map(|(id, token)| async move {
                let outcome = match population.agent(&id) {
                    Some(agent) => TaskOutcome::from_result(
                        self.forge.compute_fitness(agent, token, generation).await,
                    ),
                    None => TaskOutcome::Failed(format!("agent {} not in population", id)),
                };
                (id, token, outcome)
            }))
            .await
        };

        for (id, token, outcome) in results {
            let fitness = match outcome {
                TaskOutcome::Ok((_, fitness)) if fitness.is_finite() => fitness,
                TaskOutcome::Ok((_, fitness)) => {
                    warn!(agent_id = %id, fitness, "Non-finite fitness, scoring zero");
                    0.0
                }
                TaskOutcome::BudgetExhausted => {
                    warn!(agent_id = %id, "Evaluation ran out of budget, scoring zero");
                    0.0
                }
                TaskOutcome::Failed(reason) => {
                    warn!(agent_id = %id, %reason, "Evaluation failed, scoring zero");
                    0.0
                }
            };
            let cost = self.budget.spend(token)?;
            if record_costs {
                population.record_first_generation_cost(id.clone(), cost);
            }
            debug!(agent_id = %id, fitness, cost, "Agent evaluated");
            self.events.publish(ForgeEvent::AgentEvaluated {
                generation,
                agent_id: id.clone(),
                fitness,
                cost,
            });
            population.set_fitness(id, fitness);
        }
        Ok(())
    }

    async fn recombine(
        &self,
        master: TokenId,
        generation: u32,
        parents: &[AgentId],
        population: &Population,
        rng: &mut StdRng,
    ) -> Result<Vec<Agent>> {
        // One token for the whole batch: every task draws on the same allocation.
        let limit = self.config.genetic_operator_budget_ratio * self.budget_limit();
        let phase = self.budget.issue_child(limit, master)?;
        let mut plans = Vec::with_capacity(parents.len());
        for (parent_id, partner_id) in pair_parents(parents, rng) {
            let Some(parent) = population.agent(&parent_id).cloned() else {
                continue;
            };
            let partner = partner_id.and_then(|id| population.agent(&id).cloned());
            let plan = self.operators.plan(parent, partner, rng);
            let fallback = self.operators.pick_architect(rng);
            plans.push((plan, fallback));
        }

        let ctx = self.operator_context();
        let outcomes = join_all(plans.into_iter().map(|(plan, fallback)| {
            let ctx = &ctx;
            async move {
                if self.budget.is_exhausted(phase) {
                    return TaskOutcome::BudgetExhausted;
                }
                recombine_task(plan, fallback, ctx, phase).await
            }
        }))
        .await;

        let mut offspring = Vec::new();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Ok((child, operator)) => {
                    debug!(generation, agent_id = %child.id, operator = %operator, "Offspring created");
                    self.events.publish(ForgeEvent::OffspringCreated {
                        generation,
                        agent_id: child.id.clone(),
                        parent_ids: child.provenance.parent_ids.clone(),
                        operator,
                    });
                    offspring.push(child);
                }
                TaskOutcome::BudgetExhausted => {
                    warn!(generation, "Recombination ran out of budget, slot dropped")
                }
                TaskOutcome::Failed(reason) => {
                    warn!(generation, %reason, "Recombination failed, slot dropped")
                }
            }
        }
        debug!(generation, spend = self.budget.spend(phase)?, limit, "Recombination phase billed");
        Ok(offspring)
    }

    /// Snapshots are for inspection only; a failed write is logged and the
    /// run goes on.
    async fn snapshot(&self, label: &str, population: &Population) {
        if let Some(dir) = &self.config.snapshot_dir {
            if let Err(e) = SnapshotWriter::new(dir).write(label, population).await {
                warn!(label, dir = %dir.display(), error = %e, "Snapshot write failed");
            }
        }
    }
}

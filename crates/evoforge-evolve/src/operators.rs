use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use evoforge_core::error::ForgeError;
use evoforge_core::types::{AgentId, TokenId};

use crate::agent::{Agent, Blueprint, Provenance};
use crate::outcome::TaskOutcome;
use crate::traits::{
    ArchitectOperator, ArchitectRequest, CrossoverOperator, CrossoverRequest, MutationOperator,
    MutationRequest,
};

/// The operators available to a cycle. One is drawn at random per task.
#[derive(Clone)]
pub struct OperatorSet {
    pub architects: Vec<Arc<dyn ArchitectOperator>>,
    pub crossovers: Vec<Arc<dyn CrossoverOperator>>,
    pub mutations: Vec<Arc<dyn MutationOperator>>,
}

impl OperatorSet {
    pub fn new(architect: Arc<dyn ArchitectOperator>) -> Self {
        Self {
            architects: vec![architect],
            crossovers: Vec::new(),
            mutations: Vec::new(),
        }
    }

    pub fn with_architect(mut self, architect: Arc<dyn ArchitectOperator>) -> Self {
        self.architects.push(architect);
        self
    }

    pub fn with_crossover(mut self, crossover: Arc<dyn CrossoverOperator>) -> Self {
        self.crossovers.push(crossover);
        self
    }

    pub fn with_mutation(mut self, mutation: Arc<dyn MutationOperator>) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn pick_architect<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Arc<dyn ArchitectOperator>> {
        self.architects.choose(rng).cloned()
    }

    /// Decide how to produce an offspring from `parent`.
    ///
    /// Crossover needs a partner; without one (or without crossover
    /// operators) the parent is mutated. With no genetic operators at all the
    /// slot is handed to an architect.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        parent: Agent,
        partner: Option<Agent>,
        rng: &mut R,
    ) -> Recombination {
        let crossover = self.crossovers.choose(rng).cloned();
        let mutation = self.mutations.choose(rng).cloned();
        match (crossover, mutation, partner) {
            (Some(operator), _, Some(partner)) => Recombination::Crossover {
                operator,
                parent,
                partner,
            },
            (_, Some(operator), _) => Recombination::Mutation { operator, parent },
            (Some(operator), None, None) => Recombination::Crossover {
                operator,
                partner: parent.clone(),
                parent,
            },
            (None, None, _) => Recombination::Architect,
        }
    }
}

/// One planned offspring.
pub enum Recombination {
    Crossover {
        operator: Arc<dyn CrossoverOperator>,
        parent: Agent,
        partner: Agent,
    },
    Mutation {
        operator: Arc<dyn MutationOperator>,
        parent: Agent,
    },
    Architect,
}

/// Problem context shared by every operator request.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    pub forge_description: String,
    pub node_types: Vec<String>,
}

impl OperatorContext {
    fn architect_request(&self, feedback: Vec<evoforge_graph::ValidationError>) -> ArchitectRequest {
        ArchitectRequest {
            forge_description: self.forge_description.clone(),
            node_types: self.node_types.clone(),
            feedback,
        }
    }
}

enum Attempt {
    Built(Agent),
    Invalid(Vec<evoforge_graph::ValidationError>),
    Errored(ForgeError),
}

fn build(result: evoforge_core::Result<Blueprint>, provenance: Provenance) -> Attempt {
    match result {
        Ok(blueprint) => match Agent::from_blueprint(blueprint, provenance) {
            Ok(agent) => Attempt::Built(agent),
            Err(errors) => Attempt::Invalid(errors.0),
        },
        Err(e) => Attempt::Errored(e),
    }
}

/// Ask an architect for a new agent, retrying once.
///
/// An invalid graph is retried with its validation errors as feedback; any
/// other failure is retried as-is. Budget exhaustion ends the task at once.
pub async fn architect_task(
    architect: Arc<dyn ArchitectOperator>,
    ctx: &OperatorContext,
    token: TokenId,
) -> TaskOutcome<Agent> {
    let mut feedback = Vec::new();
    let mut last_failure = String::new();
    for attempt in 1..=2u32 {
        let result = architect
            .architect(ctx.architect_request(feedback.clone()), token)
            .await;
        match build(result, Provenance::architected(architect.id().clone())) {
            Attempt::Built(agent) => {
                debug!(agent_id = %agent.id, attempt, "Architect produced agent");
                return TaskOutcome::Ok(agent);
            }
            Attempt::Invalid(errors) => {
                warn!(operator = %architect.id(), attempt, errors = errors.len(), "Architect produced invalid graph");
                last_failure = format!("invalid graph ({} errors)", errors.len());
                feedback = errors;
            }
            Attempt::Errored(e) if e.is_budget_exceeded() => return TaskOutcome::BudgetExhausted,
            Attempt::Errored(e) => {
                warn!(operator = %architect.id(), attempt, error = %e, "Architect failed");
                last_failure = e.to_string();
            }
        }
    }
    TaskOutcome::Failed(last_failure)
}

/// Produce one offspring, falling back once to an architect when the
/// genetic operator fails or returns an invalid graph.
pub async fn recombine_task(
    plan: Recombination,
    fallback: Option<Arc<dyn ArchitectOperator>>,
    ctx: &OperatorContext,
    token: TokenId,
) -> TaskOutcome<(Agent, AgentId)> {
    let (attempt, operator_id) = match plan {
        Recombination::Crossover {
            operator,
            parent,
            partner,
        } => {
            let parents = vec![parent.id.clone(), partner.id.clone()];
            let request = CrossoverRequest {
                forge_description: ctx.forge_description.clone(),
                node_types: ctx.node_types.clone(),
                parent,
                partner,
            };
            let result = operator.crossover(request, token).await;
            let id = operator.id().clone();
            (Some(build(result, Provenance::bred(parents, id.clone()))), Some(id))
        }
        Recombination::Mutation { operator, parent } => {
            let parents = vec![parent.id.clone()];
            let request = MutationRequest {
                forge_description: ctx.forge_description.clone(),
                node_types: ctx.node_types.clone(),
                parent,
            };
            let result = operator.mutate(request, token).await;
            let id = operator.id().clone();
            (Some(build(result, Provenance::bred(parents, id.clone()))), Some(id))
        }
        Recombination::Architect => (None, None),
    };

    let mut feedback = Vec::new();
    match (attempt, operator_id) {
        (Some(Attempt::Built(agent)), Some(id)) => return TaskOutcome::Ok((agent, id)),
        (Some(Attempt::Errored(e)), _) if e.is_budget_exceeded() => {
            return TaskOutcome::BudgetExhausted
        }
        (Some(Attempt::Errored(e)), Some(id)) => {
            warn!(operator = %id, error = %e, "Genetic operator failed, falling back to architect");
        }
        (Some(Attempt::Invalid(errors)), Some(id)) => {
            warn!(operator = %id, errors = errors.len(), "Genetic operator produced invalid graph, falling back to architect");
            feedback = errors;
        }
        _ => {}
    }

    let Some(architect) = fallback else {
        return TaskOutcome::Failed("no architect available for fallback".into());
    };
    let result = architect
        .architect(ctx.architect_request(feedback), token)
        .await;
    match build(result, Provenance::architected(architect.id().clone())) {
        Attempt::Built(agent) => TaskOutcome::Ok((agent, architect.id().clone())),
        Attempt::Invalid(errors) => {
            TaskOutcome::Failed(format!("fallback architect produced invalid graph ({} errors)", errors.len()))
        }
        Attempt::Errored(e) => TaskOutcome::from_result(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use serde_json::json;

    use evoforge_core::error::Result;
    use evoforge_core::types::BudgetScope;
    use evoforge_graph::RawGraph;

    use super::*;

    fn raw(valid: bool) -> RawGraph {
        let mut edges = vec![json!({"from": "start_node", "to": "solve"})];
        if valid {
            edges.push(json!({"from": "solve", "to": "end_node"}));
        }
        RawGraph {
            nodes: vec![
                json!({"type": "StartNode"}),
                json!({"type": "LLMNode", "id": "solve", "purpose": "p", "prompt": "q"}),
                json!({"type": "EndNode"}),
            ],
            edges,
            ..Default::default()
        }
    }

    /// Returns invalid graphs for the first `invalid_first` calls.
    struct Architect {
        id: AgentId,
        invalid_first: usize,
        budget_error: bool,
        calls: AtomicUsize,
        feedback_seen: Mutex<Vec<usize>>,
    }

    impl Architect {
        fn new(invalid_first: usize) -> Self {
            Self {
                id: AgentId::from_str("architect"),
                invalid_first,
                budget_error: false,
                calls: AtomicUsize::new(0),
                feedback_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ArchitectOperator for Architect {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn architect(
            &self,
            request: ArchitectRequest,
            _token: TokenId,
        ) -> BoxFuture<'_, Result<Blueprint>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.feedback_seen.lock().unwrap().push(request.feedback.len());
            let budget_error = self.budget_error;
            let valid = n >= self.invalid_first;
            Box::pin(async move {
                if budget_error {
                    return Err(ForgeError::BudgetExceeded {
                        scope: BudgetScope::Child,
                        limit: 0.1,
                        total: 0.2,
                    });
                }
                Ok(Blueprint {
                    name: format!("designed-{}", n),
                    description: String::new(),
                    graph: raw(valid),
                })
            })
        }
    }

    struct BrokenMutation(AgentId);

    impl MutationOperator for BrokenMutation {
        fn id(&self) -> &AgentId {
            &self.0
        }

        fn mutate(&self, _request: MutationRequest, _token: TokenId) -> BoxFuture<'_, Result<Blueprint>> {
            Box::pin(async { Err(ForgeError::ModelParse("unreadable".into())) })
        }
    }

    struct Splice(AgentId);

    impl CrossoverOperator for Splice {
        fn id(&self) -> &AgentId {
            &self.0
        }

        fn crossover(&self, request: CrossoverRequest, _token: TokenId) -> BoxFuture<'_, Result<Blueprint>> {
            Box::pin(async move {
                Ok(Blueprint {
                    name: format!("{}x{}", request.parent.name, request.partner.name),
                    description: String::new(),
                    graph: raw(true),
                })
            })
        }
    }

    fn ctx() -> OperatorContext {
        OperatorContext {
            forge_description: "add numbers".into(),
            node_types: vec!["StartNode".into(), "EndNode".into(), "LLMNode".into()],
        }
    }

    fn parent(name: &str) -> Agent {
        Agent::from_blueprint(
            Blueprint {
                name: name.into(),
                description: String::new(),
                graph: raw(true),
            },
            Provenance::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn architect_retries_invalid_graph_with_feedback() {
        let architect = Arc::new(Architect::new(1));
        let outcome = architect_task(architect.clone(), &ctx(), TokenId::new()).await;
        let agent = outcome.ok().unwrap();
        assert_eq!(agent.name, "designed-1");
        let seen = architect.feedback_seen.lock().unwrap();
        assert_eq!(seen[0], 0);
        assert!(seen[1] > 0);
    }

    #[tokio::test]
    async fn architect_gives_up_after_second_invalid_graph() {
        let architect = Arc::new(Architect::new(5));
        let outcome = architect_task(architect.clone(), &ctx(), TokenId::new()).await;
        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert_eq!(architect.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn architect_stops_on_budget_exhaustion() {
        let mut architect = Architect::new(0);
        architect.budget_error = true;
        let architect = Arc::new(architect);
        let outcome = architect_task(architect.clone(), &ctx(), TokenId::new()).await;
        assert_eq!(outcome, TaskOutcome::BudgetExhausted);
        assert_eq!(architect.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn crossover_records_both_parents() {
        let set = OperatorSet::new(Arc::new(Architect::new(0)))
            .with_crossover(Arc::new(Splice(AgentId::from_str("splice"))));
        let (a, b) = (parent("A"), parent("B"));
        let plan = set.plan(a.clone(), Some(b.clone()), &mut rand::thread_rng());
        let (child, operator) = recombine_task(plan, set.pick_architect(&mut rand::thread_rng()), &ctx(), TokenId::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(child.name, "AxB");
        assert_eq!(operator, AgentId::from_str("splice"));
        assert_eq!(child.provenance.parent_ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn failed_mutation_falls_back_to_architect() {
        let set = OperatorSet::new(Arc::new(Architect::new(0)))
            .with_mutation(Arc::new(BrokenMutation(AgentId::from_str("mutant"))));
        let plan = set.plan(parent("A"), None, &mut rand::thread_rng());
        assert!(matches!(plan, Recombination::Mutation { .. }));
        let (child, operator) = recombine_task(plan, set.pick_architect(&mut rand::thread_rng()), &ctx(), TokenId::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(operator, AgentId::from_str("architect"));
        assert_eq!(
            child.provenance.architect_agent_id,
            Some(AgentId::from_str("architect"))
        );
        assert!(child.provenance.parent_ids.is_empty());
    }

    #[test]
    fn plan_without_partner_prefers_mutation() {
        let set = OperatorSet::new(Arc::new(Architect::new(0)))
            .with_crossover(Arc::new(Splice(AgentId::from_str("splice"))))
            .with_mutation(Arc::new(BrokenMutation(AgentId::from_str("mutant"))));
        let plan = set.plan(parent("A"), None, &mut rand::thread_rng());
        assert!(matches!(plan, Recombination::Mutation { .. }));

        let bare = OperatorSet::new(Arc::new(Architect::new(0)));
        assert!(matches!(
            bare.plan(parent("A"), Some(parent("B")), &mut rand::thread_rng()),
            Recombination::Architect
        ));
    }
}

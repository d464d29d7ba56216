use std::sync::Arc;

use serde_json::json;

use evoforge_budget::BudgetManager;
use evoforge_core::config::{EngineConfig, ForgeConfig};
use evoforge_core::error::ForgeError;
use evoforge_core::traits::ModelClient;
use evoforge_core::types::BudgetScope;
use evoforge_graph::{validate, GraphEngine, KeywordRouter, ModelRouter, RawGraph};
use evoforge_llm::{build_client, CallGate};
use evoforge_test_utils::MockModel;

fn two_step_graph() -> RawGraph {
    RawGraph {
        nodes: vec![
            json!({"type": "StartNode"}),
            json!({"type": "LLMNode", "id": "draft", "purpose": "draft", "prompt": "Draft an answer to {question}"}),
            json!({"type": "LLMNode", "id": "polish", "purpose": "polish", "prompt": "Polish the draft"}),
            json!({"type": "EndNode"}),
        ],
        edges: vec![
            json!({"from": "start_node", "to": "draft"}),
            json!({"from": "draft", "to": "polish"}),
            json!({"from": "polish", "to": "end_node"}),
        ],
        ..Default::default()
    }
}

fn stack(model: Arc<MockModel>, budget: Arc<BudgetManager>) -> Arc<dyn ModelClient> {
    let config = ForgeConfig::default();
    let gate = Arc::new(CallGate::per_minute(config.gate.calls_per_minute));
    build_client(model, budget, gate, &config)
}

#[tokio::test]
async fn test_graph_run_bills_child_and_master() {
    let budget = Arc::new(BudgetManager::new());
    let master = budget.acquire_master(1.0).unwrap();
    let child = budget.issue_child(0.5, master).unwrap();
    let model = Arc::new(MockModel::new(&["rough answer", "final answer"]).with_cost(0.2));
    let engine = GraphEngine::new(
        stack(model.clone(), budget.clone()),
        Arc::new(KeywordRouter),
        EngineConfig::default(),
    );

    let graph = validate(two_step_graph()).unwrap();
    let output = engine
        .run(&graph, json!({"question": "2 + 2?"}), child)
        .await
        .unwrap();

    assert_eq!(output.answer(), Some("final answer"));
    assert_eq!(output.path, vec!["start_node", "draft", "polish", "end_node"]);
    assert!((budget.spend(child).unwrap() - 0.4).abs() < 1e-9);
    assert!((budget.master_spend() - 0.4).abs() < 1e-9);
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_graph_run_stops_when_child_budget_runs_out() {
    let budget = Arc::new(BudgetManager::new());
    let master = budget.acquire_master(1.0).unwrap();
    let child = budget.issue_child(0.3, master).unwrap();
    let model = Arc::new(MockModel::new(&["rough answer", "final answer"]).with_cost(0.2));
    let engine = GraphEngine::new(
        stack(model.clone(), budget.clone()),
        Arc::new(KeywordRouter),
        EngineConfig::default(),
    );

    let graph = validate(two_step_graph()).unwrap();
    let err = engine
        .run(&graph, json!({"question": "2 + 2?"}), child)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ForgeError::BudgetExceeded {
            scope: BudgetScope::Child,
            ..
        }
    ));
    // The overrunning call is still billed.
    assert!((budget.spend(child).unwrap() - 0.4).abs() < 1e-9);
    assert!(budget.is_exhausted(child));

    // Further calls on the token are refused before reaching the model.
    let again = engine.run(&graph, json!({"question": "3 + 3?"}), child).await;
    assert!(again.unwrap_err().is_budget_exceeded());
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_model_router_chooses_branch_through_stack() {
    let raw = RawGraph {
        nodes: vec![
            json!({"type": "StartNode"}),
            json!({"type": "LLMNode", "id": "classify", "purpose": "classify", "prompt": "Is {review} positive?"}),
            json!({"type": "LLMNode", "id": "thank", "purpose": "reply", "prompt": "Thank the reviewer"}),
            json!({"type": "LLMNode", "id": "apologize", "purpose": "reply", "prompt": "Apologize"}),
            json!({"type": "EndNode"}),
        ],
        edges: vec![
            json!({"from": "start_node", "to": "classify"}),
            json!({"from": "classify", "to": "thank", "condition": "positive"}),
            json!({"from": "classify", "to": "apologize", "condition": "negative"}),
            json!({"from": "thank", "to": "end_node"}),
            json!({"from": "apologize", "to": "end_node"}),
        ],
        ..Default::default()
    };
    let graph = validate(raw).unwrap();

    let budget = Arc::new(BudgetManager::new());
    let master = budget.acquire_master(1.0).unwrap();
    let child = budget.issue_child(1.0, master).unwrap();
    // Classifier reply, router reply, then the branch reply.
    let model = Arc::new(
        MockModel::new(&["The reviewer loved it.", "positive", "Thank you!"]).with_cost(0.01),
    );
    let client = stack(model.clone(), budget.clone());
    let engine = GraphEngine::new(
        client.clone(),
        Arc::new(ModelRouter::new(client)),
        EngineConfig::default(),
    );

    let output = engine
        .run(&graph, json!({"review": "Great product"}), child)
        .await
        .unwrap();

    assert_eq!(output.path, vec!["start_node", "classify", "thank", "end_node"]);
    assert_eq!(output.answer(), Some("Thank you!"));
    assert_eq!(model.call_count(), 3);
    assert!((budget.spend(child).unwrap() - 0.03).abs() < 1e-9);
}

#[tokio::test]
async fn test_gate_counts_every_call() {
    let budget = Arc::new(BudgetManager::new());
    let master = budget.acquire_master(1.0).unwrap();
    let child = budget.issue_child(1.0, master).unwrap();
    let gate = Arc::new(CallGate::per_minute(100));
    let model = Arc::new(MockModel::new(&["a", "b"]));
    let client = build_client(model, budget, gate.clone(), &ForgeConfig::default());
    let engine = GraphEngine::new(client, Arc::new(KeywordRouter), EngineConfig::default());

    let graph = validate(two_step_graph()).unwrap();
    engine
        .run(&graph, json!({"question": "?"}), child)
        .await
        .unwrap();

    assert_eq!(gate.in_flight_window().await, 2);
}

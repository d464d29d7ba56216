use serde_json::json;

use evoforge_evolve::{Agent, Blueprint, Provenance};
use evoforge_graph::RawGraph;

/// Start -> one model node -> End.
pub fn linear_raw_graph(node: &str) -> RawGraph {
    RawGraph {
        nodes: vec![
            json!({"type": "StartNode"}),
            json!({"type": "LLMNode", "id": node, "purpose": "solve", "prompt": "Solve {problem}"}),
            json!({"type": "EndNode"}),
        ],
        edges: vec![
            json!({"from": "start_node", "to": node}),
            json!({"from": node, "to": "end_node"}),
        ],
        description: format!("single-step agent using {}", node),
        shared_context_prompt: "You are part of a problem-solving workflow.".into(),
    }
}

/// A graph whose last node has no path to the end node.
pub fn broken_raw_graph() -> RawGraph {
    RawGraph {
        nodes: vec![
            json!({"type": "StartNode"}),
            json!({"type": "LLMNode", "id": "solve", "purpose": "solve", "prompt": "Solve"}),
            json!({"type": "EndNode"}),
        ],
        edges: vec![json!({"from": "start_node", "to": "solve"})],
        ..Default::default()
    }
}

/// A valid agent named `name` with no lineage.
pub fn agent_named(name: &str) -> Agent {
    Agent::from_blueprint(
        Blueprint {
            name: name.into(),
            description: format!("agent {}", name),
            graph: linear_raw_graph("solve"),
        },
        Provenance::default(),
    )
    .expect("fixture graph is valid")
}

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::node::{Node, NodeKind};
use crate::validate::{validate, RawGraph, ValidationErrors};

/// A validated workflow graph.
///
/// Only [`validate`] builds one, so every `Graph` satisfies the structural
/// invariants: one start node, one end node, consistent edge endpoints, and
/// unambiguous branching. Graphs are immutable; edit the raw form and
/// validate again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGraph", into = "RawGraph")]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    start: usize,
    end: usize,
    description: String,
    shared_context_prompt: String,
}

impl Graph {
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        description: String,
        shared_context_prompt: String,
    ) -> Self {
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let start = nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Start))
            .unwrap_or(0);
        let end = nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::End))
            .unwrap_or(0);
        Self {
            nodes,
            index,
            edges,
            start,
            end,
            description,
            shared_context_prompt,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn start_node(&self) -> &Node {
        &self.nodes[self.start]
    }

    pub fn end_node(&self) -> &Node {
        &self.nodes[self.end]
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn shared_context_prompt(&self) -> &str {
        &self.shared_context_prompt
    }

    /// Edges leaving `id`, in declaration order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Branch conditions on the edges leaving `id`.
    pub fn conditions(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .filter_map(|e| e.condition.as_deref())
            .collect()
    }

    pub fn to_raw(&self) -> RawGraph {
        RawGraph::from(self.clone())
    }

    /// Render the graph as a Mermaid flowchart.
    pub fn to_mermaid(&self, orientation: &str) -> String {
        let mut out = format!("flowchart {}\n", orientation);
        for node in &self.nodes {
            let label = node.name.replace('"', "#quot;");
            let _ = match node.kind {
                NodeKind::Start | NodeKind::End => {
                    writeln!(out, "    {}([\"{}\"])", node.id, label)
                }
                NodeKind::Routing | NodeKind::RegexRouting | NodeKind::Validator { .. } => {
                    writeln!(out, "    {}{{\"{}\"}}", node.id, label)
                }
                NodeKind::Llm { .. } => writeln!(out, "    {}[\"{}\"]", node.id, label),
            };
        }
        for edge in &self.edges {
            let _ = match &edge.condition {
                Some(cond) => writeln!(
                    out,
                    "    {} -->|{}| {}",
                    edge.from,
                    cond.replace('|', "#124;"),
                    edge.to
                ),
                None => writeln!(out, "    {} --> {}", edge.from, edge.to),
            };
        }
        out
    }
}

impl TryFrom<RawGraph> for Graph {
    type Error = ValidationErrors;

    fn try_from(raw: RawGraph) -> Result<Self, Self::Error> {
        validate(raw)
    }
}

impl From<Graph> for RawGraph {
    fn from(graph: Graph) -> Self {
        RawGraph {
            nodes: graph
                .nodes
                .iter()
                .filter_map(|n| serde_json::to_value(n).ok())
                .collect(),
            edges: graph
                .edges
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect(),
            description: graph.description,
            shared_context_prompt: graph.shared_context_prompt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn branching() -> Graph {
        let raw: RawGraph = serde_json::from_value(json!({
            "description": "review loop",
            "nodes": [
                {"type": "StartNode"},
                {"type": "LLMNode", "id": "draft", "name": "Draft", "purpose": "write", "prompt": "Write"},
                {"type": "RegexRoutingNode", "id": "check", "name": "Check"},
                {"type": "EndNode"}
            ],
            "edges": [
                {"from": "start_node", "to": "draft"},
                {"from": "draft", "to": "check"},
                {"from": "check", "to": "end_node", "condition": "done"},
                {"from": "check", "to": "draft", "condition": "retry"}
            ]
        }))
        .unwrap();
        validate(raw).unwrap()
    }

    #[test]
    fn accessors_follow_edges() {
        let graph = branching();
        assert_eq!(graph.start_node().id, "start_node");
        assert_eq!(graph.end_node().id, "end_node");
        assert_eq!(graph.outgoing("check").len(), 2);
        assert_eq!(graph.conditions("check"), vec!["done", "retry"]);
        assert!(graph.conditions("draft").is_empty());
        assert_eq!(graph.node("draft").map(|n| n.name.as_str()), Some("Draft"));
    }

    #[test]
    fn serde_goes_through_validation() {
        let graph = branching();
        let json = serde_json::to_value(&graph).unwrap();
        let back: Graph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);

        let broken = json!({"nodes": [{"type": "StartNode"}], "edges": []});
        assert!(serde_json::from_value::<Graph>(broken).is_err());
    }

    #[test]
    fn mermaid_lists_nodes_and_labelled_edges() {
        let mermaid = branching().to_mermaid("TD");
        assert!(mermaid.starts_with("flowchart TD\n"));
        assert!(mermaid.contains("draft[\"Draft\"]"));
        assert!(mermaid.contains("check{\"Check\"}"));
        assert!(mermaid.contains("check -->|retry| draft"));
        assert!(mermaid.contains("start_node --> draft"));
    }
}

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::edge::Edge;
use crate::graph::Graph;
use crate::node::{Node, NodeKind, NodeTag, END_NODE_ID, NODE_TYPES, START_NODE_ID};

/// Unvalidated graph as produced by operators or read from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shared_context_prompt: String,
}

/// One problem found in a raw graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Where the problem is, e.g. `nodes[2]` or `nodes.router`.
    pub location: String,
    pub message: String,
}

impl ValidationError {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Every problem found in a raw graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("graph validation failed with {} error(s): {}", .0.len(), summarize(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Whether any error mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0
            .iter()
            .any(|e| e.message.contains(needle) || e.location.contains(needle))
    }
}

/// Validate a raw graph, reporting every problem found rather than the first.
///
/// Checks run in a fixed order: node type tags and decoding, node/edge
/// referential consistency, the single-conditional-edge fix-up, branch
/// conditionality, duplicate edges, and finally reachability of the start
/// and end nodes (only when everything else passed).
pub fn validate(raw: RawGraph) -> Result<Graph, ValidationErrors> {
    let RawGraph {
        nodes: raw_nodes,
        edges: raw_edges,
        description,
        shared_context_prompt,
    } = raw;
    let mut errors = Vec::new();

    if raw_nodes.is_empty() {
        errors.push(ValidationError::new("nodes", "graph must contain at least one node"));
    }
    if raw_edges.is_empty() {
        errors.push(ValidationError::new("edges", "graph must contain at least one edge"));
    }

    // Nodes
    let mut nodes: Vec<(usize, Node)> = Vec::new();
    let mut seen_ids = HashSet::new();
    for (i, raw) in raw_nodes.into_iter().enumerate() {
        match decode_node(raw) {
            Ok(node) => {
                if seen_ids.insert(node.id.clone()) {
                    nodes.push((i, node));
                } else {
                    errors.push(ValidationError::new(
                        format!("nodes[{}].id", i),
                        format!("duplicate node id '{}'", node.id),
                    ));
                }
            }
            Err(msg) => errors.push(ValidationError::new(format!("nodes[{}]", i), msg)),
        }
    }
    for (tag, label) in [(NodeTag::Start, "StartNode"), (NodeTag::End, "EndNode")] {
        let count = nodes.iter().filter(|(_, n)| n.tag() == tag).count();
        if count != 1 {
            errors.push(ValidationError::new(
                "nodes",
                format!("expected exactly one {}, found {}", label, count),
            ));
        }
    }

    // Edges
    let mut edges: Vec<(usize, Edge)> = Vec::new();
    for (j, raw) in raw_edges.into_iter().enumerate() {
        match decode_edge(raw) {
            Ok(edge) => edges.push((j, edge)),
            Err(msg) => errors.push(ValidationError::new(format!("edges[{}]", j), msg)),
        }
    }

    // Referential consistency
    let node_ids: HashSet<&str> = nodes.iter().map(|(_, n)| n.id.as_str()).collect();
    for (j, edge) in &edges {
        for endpoint in [&edge.from, &edge.to] {
            if !node_ids.contains(endpoint.as_str()) {
                errors.push(ValidationError::new(
                    format!("edges[{}]", j),
                    format!(
                        "edge from '{}' to '{}' references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    ),
                ));
            }
        }
    }
    let connected: HashSet<&str> = edges
        .iter()
        .flat_map(|(_, e)| [e.from.as_str(), e.to.as_str()])
        .collect();
    for (i, node) in &nodes {
        if !connected.contains(node.id.as_str()) {
            errors.push(ValidationError::new(
                format!("nodes[{}]", i),
                format!("node '{}' is not connected to any edge", node.id),
            ));
        }
    }

    // A lone conditional edge is an unconditional edge
    let mut out_degree: HashMap<String, usize> = HashMap::new();
    for (_, edge) in &edges {
        *out_degree.entry(edge.from.clone()).or_default() += 1;
    }
    for (_, edge) in edges.iter_mut() {
        if out_degree.get(&edge.from) == Some(&1) {
            if let Some(cond) = edge.condition.take() {
                debug!(node_id = %edge.from, condition = %cond, "Dropped condition on single outgoing edge");
            }
        }
    }

    // Branch conditionality
    let mut order: Vec<&str> = Vec::new();
    let mut by_source: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for (_, edge) in &edges {
        let outs = by_source.entry(edge.from.as_str()).or_insert_with(|| {
            order.push(edge.from.as_str());
            Vec::new()
        });
        outs.push(edge);
    }
    for from in &order {
        let outs = &by_source[from];
        if outs.len() < 2 {
            continue;
        }
        let location = format!("nodes.{}", from);
        let conditional = outs.iter().filter(|e| e.is_conditional()).count();
        if conditional > 0 && conditional < outs.len() {
            errors.push(ValidationError::new(
                location,
                format!(
                    "node '{}' mixes conditional and unconditional outgoing edges",
                    from
                ),
            ));
        } else if conditional == 0 {
            errors.push(ValidationError::new(
                location,
                format!(
                    "node '{}' has {} unconditional outgoing edges; branches need distinct conditions",
                    from,
                    outs.len()
                ),
            ));
        } else {
            let mut seen = HashSet::new();
            let mut reported = HashSet::new();
            for cond in outs.iter().filter_map(|e| e.condition.as_deref()) {
                if !seen.insert(cond) && reported.insert(cond) {
                    errors.push(ValidationError::new(
                        location.clone(),
                        format!(
                            "condition '{}' is used by more than one outgoing edge of node '{}'",
                            cond, from
                        ),
                    ));
                }
            }
        }
    }

    // Duplicate edges
    let mut pairs: HashMap<(&str, &str), usize> = HashMap::new();
    for (j, edge) in &edges {
        let count = pairs
            .entry((edge.from.as_str(), edge.to.as_str()))
            .or_default();
        *count += 1;
        if *count == 2 {
            errors.push(ValidationError::new(
                format!("edges[{}]", j),
                format!("duplicate edge from '{}' to '{}'", edge.from, edge.to),
            ));
        }
    }

    if errors.is_empty() {
        check_reachability(&nodes, &edges, &mut errors);
    }

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    Ok(Graph::from_parts(
        nodes.into_iter().map(|(_, n)| n).collect(),
        edges.into_iter().map(|(_, e)| e).collect(),
        description,
        shared_context_prompt,
    ))
}

fn decode_node(raw: Value) -> Result<Node, String> {
    let mut obj = match raw {
        Value::Object(obj) => obj,
        other => return Err(format!("expected a JSON object, got {}", other)),
    };

    let tag = match obj.get("type") {
        None => return Err("field 'type' is required".into()),
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(format!("field 'type' must be a string, got {}", other)),
    };
    let Some(kind) = NodeTag::lookup(&tag) else {
        let known: Vec<&str> = NODE_TYPES.iter().map(|(name, _)| *name).collect();
        return Err(format!(
            "unknown node type '{}' (expected one of: {})",
            tag,
            known.join(", ")
        ));
    };

    normalize_id_field(&mut obj, "id")?;
    let default_id = match kind {
        NodeTag::Start => Some(START_NODE_ID),
        NodeTag::End => Some(END_NODE_ID),
        _ => None,
    };
    let id = match (obj.get("id"), default_id) {
        (Some(Value::String(id)), _) => id.clone(),
        (None, Some(default)) => {
            obj.insert("id".into(), Value::String(default.into()));
            default.to_string()
        }
        _ => return Err("field 'id' is required".into()),
    };
    if id.is_empty() {
        return Err("field 'id' must not be empty".into());
    }
    obj.entry("name").or_insert_with(|| Value::String(id));

    serde_json::from_value::<Node>(Value::Object(obj)).map_err(|e| e.to_string())
}

fn decode_edge(raw: Value) -> Result<Edge, String> {
    let mut obj = match raw {
        Value::Object(obj) => obj,
        other => return Err(format!("expected a JSON object, got {}", other)),
    };
    for field in ["from", "to", "start_node_id", "end_node_id"] {
        normalize_id_field(&mut obj, field)?;
    }
    serde_json::from_value::<Edge>(Value::Object(obj)).map_err(|e| e.to_string())
}

/// Integer ids become strings; `:` becomes `_`.
fn normalize_id_field(obj: &mut Map<String, Value>, field: &str) -> Result<(), String> {
    let Some(value) = obj.get_mut(field) else {
        return Ok(());
    };
    match value {
        Value::String(s) => {
            if s.contains(':') {
                *s = s.replace(':', "_");
            }
            Ok(())
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            let id = n.to_string();
            *value = Value::String(id);
            Ok(())
        }
        other => Err(format!(
            "field '{}' must be a string or integer, got {}",
            field, other
        )),
    }
}

fn check_reachability(
    nodes: &[(usize, Node)],
    edges: &[(usize, Edge)],
    errors: &mut Vec<ValidationError>,
) {
    let start = nodes
        .iter()
        .find(|(_, n)| matches!(n.kind, NodeKind::Start))
        .map(|(_, n)| n.id.as_str());
    let end = nodes
        .iter()
        .find(|(_, n)| matches!(n.kind, NodeKind::End))
        .map(|(_, n)| n.id.as_str());
    let (Some(start), Some(end)) = (start, end) else {
        return;
    };

    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut backward: HashMap<&str, Vec<&str>> = HashMap::new();
    for (_, e) in edges {
        forward.entry(e.from.as_str()).or_default().push(e.to.as_str());
        backward.entry(e.to.as_str()).or_default().push(e.from.as_str());
    }

    let from_start = reachable(start, &forward);
    let to_end = reachable(end, &backward);
    for (i, node) in nodes {
        if !from_start.contains(node.id.as_str()) {
            errors.push(ValidationError::new(
                format!("nodes[{}]", i),
                format!("node '{}' is not reachable from the start node", node.id),
            ));
        }
        if !to_end.contains(node.id.as_str()) {
            errors.push(ValidationError::new(
                format!("nodes[{}]", i),
                format!("node '{}' has no path to the end node", node.id),
            ));
        }
    }
}

fn reachable<'a>(root: &'a str, adjacency: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for next in adjacency.get(id).into_iter().flatten() {
            if seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(nodes: Value, edges: Value) -> RawGraph {
        RawGraph {
            nodes: serde_json::from_value(nodes).unwrap(),
            edges: serde_json::from_value(edges).unwrap(),
            ..Default::default()
        }
    }

    fn llm(id: &str) -> Value {
        json!({"type": "LLMNode", "id": id, "name": id, "purpose": "p", "prompt": "do it"})
    }

    #[test]
    fn accepts_linear_graph() {
        let graph = validate(raw(
            json!([{"type": "StartNode"}, llm("solve"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "solve"},
                {"from": "solve", "to": "end_node"}
            ]),
        ))
        .unwrap();
        assert_eq!(graph.nodes().len(), 3);
        assert_eq!(graph.start_node().name, "start_node");
    }

    #[test]
    fn reports_every_node_problem_by_index() {
        let err = validate(raw(
            json!([
                {"type": "StartNode"},
                {"type": "MagicNode", "id": "m"},
                {"id": "x"},
                "not an object",
                {"type": "EndNode"}
            ]),
            json!([{"from": "start_node", "to": "end_node"}]),
        ))
        .unwrap_err();
        let locations: Vec<&str> = err.iter().map(|e| e.location.as_str()).collect();
        assert!(locations.contains(&"nodes[1]"));
        assert!(locations.contains(&"nodes[2]"));
        assert!(locations.contains(&"nodes[3]"));
        assert!(err.mentions("unknown node type 'MagicNode'"));
        assert!(err.mentions("field 'type' is required"));
    }

    #[test]
    fn normalizes_integer_and_colon_ids() {
        let graph = validate(raw(
            json!([
                {"type": "StartNode"},
                {"type": "LLMNode", "id": 7, "name": "seven", "purpose": "p", "prompt": "q"},
                {"type": "LLMNode", "id": "step:2", "purpose": "p", "prompt": "q"},
                {"type": "EndNode"}
            ]),
            json!([
                {"from": "start_node", "to": 7},
                {"from": "7", "to": "step:2"},
                {"from": "step:2", "to": "end_node"}
            ]),
        ))
        .unwrap();
        assert!(graph.node("7").is_some());
        let renamed = graph.node("step_2").unwrap();
        assert_eq!(renamed.name, "step_2");
    }

    #[test]
    fn drops_condition_on_single_outgoing_edge() {
        let graph = validate(raw(
            json!([{"type": "StartNode"}, llm("a"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "a", "to": "end_node", "condition": "done"}
            ]),
        ))
        .unwrap();
        assert!(graph.outgoing("a").iter().all(|e| e.condition.is_none()));
    }

    #[test]
    fn rejects_mixed_conditionality_naming_node() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, llm("a"), llm("b"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "a", "to": "b", "condition": "ok"},
                {"from": "a", "to": "end_node"},
                {"from": "b", "to": "end_node"}
            ]),
        ))
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.0[0].location, "nodes.a");
        assert!(err.mentions("node 'a' mixes conditional and unconditional"));
    }

    #[test]
    fn rejects_repeated_conditions_and_unconditional_fanout() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, llm("a"), llm("b"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "start_node", "to": "b"},
                {"from": "a", "to": "b", "condition": "go"},
                {"from": "a", "to": "end_node", "condition": "go"},
                {"from": "b", "to": "end_node"}
            ]),
        ))
        .unwrap_err();
        assert!(err.mentions("node 'start_node' has 2 unconditional outgoing edges"));
        assert!(err.mentions("condition 'go' is used by more than one"));
    }

    #[test]
    fn rejects_duplicate_edges() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, {"type": "RegexRoutingNode", "id": "r"}, {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "r"},
                {"from": "r", "to": "end_node", "condition": "yes"},
                {"from": "r", "to": "end_node", "condition": "no"}
            ]),
        ))
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.0[0].location, "edges[2]");
        assert!(err.mentions("duplicate edge from 'r' to 'end_node'"));
    }

    #[test]
    fn reports_referential_problems() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, llm("a"), llm("lonely"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "a", "to": "ghost"}
            ]),
        ))
        .unwrap_err();
        assert!(err.mentions("references unknown node 'ghost'"));
        assert!(err.mentions("node 'lonely' is not connected to any edge"));
        assert!(err.mentions("node 'end_node' is not connected to any edge"));
    }

    #[test]
    fn requires_single_start_and_end() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, {"type": "StartNode", "id": "s2"}, llm("a")]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "s2", "to": "a"}
            ]),
        ))
        .unwrap_err();
        assert!(err.mentions("expected exactly one StartNode, found 2"));
        assert!(err.mentions("expected exactly one EndNode, found 0"));
    }

    #[test]
    fn rejects_empty_graph() {
        let err = validate(RawGraph::default()).unwrap_err();
        assert!(err.mentions("at least one node"));
        assert!(err.mentions("at least one edge"));
    }

    #[test]
    fn checks_reachability_when_structure_is_sound() {
        let err = validate(raw(
            json!([{"type": "StartNode"}, llm("a"), llm("island"), llm("sink"), {"type": "EndNode"}]),
            json!([
                {"from": "start_node", "to": "a"},
                {"from": "a", "to": "end_node", "condition": "done"},
                {"from": "a", "to": "sink", "condition": "stuck"},
                {"from": "island", "to": "end_node"}
            ]),
        ))
        .unwrap_err();
        assert!(err.mentions("node 'island' is not reachable from the start node"));
        assert!(err.mentions("node 'sink' has no path to the end node"));
    }

    #[test]
    fn error_display_lists_locations() {
        let err = validate(RawGraph::default()).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("graph validation failed with 4 error(s)"));
        assert!(text.contains("nodes: graph must contain at least one node"));
    }
}

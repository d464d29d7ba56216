use serde::{Deserialize, Serialize};

/// A directed edge between two nodes of a workflow graph.
///
/// An edge without a condition is unconditional. Conditional edges are
/// chosen by matching the condition string produced while running the
/// source node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    #[serde(alias = "start_node_id")]
    pub from: String,
    /// Target node id.
    #[serde(alias = "end_node_id")]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Create an edge taken when the source node yields `condition`.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_builders() {
        let e = Edge::always("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(!e.is_conditional());

        let e = Edge::conditional("a", "c", "approved");
        assert_eq!(e.condition.as_deref(), Some("approved"));
    }

    #[test]
    fn test_edge_accepts_aliases() {
        let e: Edge = serde_json::from_value(serde_json::json!({
            "start_node_id": "x",
            "end_node_id": "y",
            "condition": "done"
        }))
        .unwrap();
        assert_eq!(e, Edge::conditional("x", "y", "done"));
    }

    #[test]
    fn test_unconditional_edge_omits_condition() {
        let json = serde_json::to_value(Edge::always("a", "b")).unwrap();
        assert!(json.get("condition").is_none());
    }
}

//! Workflow graphs: the structure of an agent and how a run moves through it.

pub mod edge;
pub mod engine;
pub mod graph;
pub mod node;
pub mod prompt;
pub mod router;
pub mod state;
pub mod validate;

pub use edge::Edge;
pub use engine::{GraphEngine, RunOutput};
pub use graph::Graph;
pub use node::{Node, NodeContext, NodeKind, NodeTag, NODE_TYPES};
pub use router::{KeywordRouter, ModelRouter, RoutingFallback};
pub use state::NodeState;
pub use validate::{validate, RawGraph, ValidationError, ValidationErrors};

//! Fluent builder for workflow graphs
//!
//! Provides a compact API for constructing graphs programmatically,
//! mostly used by hosts seeding a new workflow and by tests.

use crate::types::{GraphEdge, GraphNode, Position, WorkflowGraph};

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```
/// use node_engine::WorkflowBuilder;
///
/// let graph = WorkflowBuilder::new("wf-1", "My Workflow")
///     .add_node("input-1", "text-input", (0.0, 0.0))
///     .with_data(serde_json::json!({"text": "Hello"}))
///     .add_node("output-1", "text-output", (200.0, 0.0))
///     .add_edge("input-1", "text", "output-1", "text")
///     .build();
///
/// assert_eq!(graph.edges[0].id, "edge-1");
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_counter: 0,
        }
    }

    /// Add a node to the graph
    pub fn add_node(
        mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        position: (f64, f64),
    ) -> Self {
        let mut node = GraphNode::new(id, node_type);
        node.position = Position::new(position.0, position.1);
        self.nodes.push(node);
        self
    }

    /// Set data on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data = data;
        }
        self
    }

    /// Add an edge between two nodes (auto-generates edge ID)
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        let id = format!("edge-{}", self.edge_counter);
        self.edges
            .push(GraphEdge::new(id, source, source_port, target, target_port));
        self
    }

    /// Add an edge with an explicit ID
    pub fn add_edge_with_id(
        mut self,
        edge_id: impl Into<String>,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edges
            .push(GraphEdge::new(edge_id, source, source_port, target, target_port));
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph
    }
}

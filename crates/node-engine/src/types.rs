//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs, including
//! nodes, edges, ports, and their metadata. Field names serialize in
//! camelCase so definitions and graphs can be handed to a UI as-is.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for a port
pub type PortId = String;

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Accepts any type
    Any,
    /// Text string
    String,
    /// Image data (base64 encoded)
    Image,
    /// Audio data
    Audio,
    /// UI component reference
    Component,
    /// Streaming data
    Stream,
    /// Prompt text (special string for LLM input)
    Prompt,
    /// Tool definitions
    Tools,
    /// Embedding vector
    Embedding,
    /// Document/text chunk
    Document,
    /// JSON object
    Json,
    /// Boolean value
    Boolean,
    /// Numeric value
    Number,
}

impl PortDataType {
    /// Check if an output of this type can feed an input of `target` type
    pub fn is_compatible_with(&self, target: &PortDataType) -> bool {
        if matches!(self, PortDataType::Any) || matches!(target, PortDataType::Any) {
            return true;
        }

        match (self, target) {
            (PortDataType::Prompt, PortDataType::String)
            | (PortDataType::String, PortDataType::Prompt) => true,
            // Structured scalars render to text
            (PortDataType::Json | PortDataType::Number | PortDataType::Boolean, PortDataType::String) => {
                true
            }
            _ => self == target,
        }
    }
}

impl std::fmt::Display for PortDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&name)
    }
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Unique identifier for this port on its node
    pub id: PortId,
    /// Human-readable label
    pub label: String,
    /// Data type of the port
    pub data_type: PortDataType,
    /// Whether this port is required (for inputs)
    pub required: bool,
    /// Whether this port accepts multiple connections
    pub multiple: bool,
}

impl PortDefinition {
    /// Create a required port
    pub fn required(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            required: true,
            multiple: false,
        }
    }

    /// Create an optional port
    pub fn optional(id: impl Into<String>, label: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
            required: false,
            multiple: false,
        }
    }

    /// Set this port to accept multiple connections
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// Category of a node
///
/// Declaration order is the presentation order of the node palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Input nodes (user input, literals)
    Input,
    /// Processing nodes (LLM, templating, etc.)
    Processing,
    /// Control flow nodes (conditionals, merges)
    Control,
    /// Tool nodes (function calls, integrations)
    Tool,
    /// Output nodes (display, export)
    Output,
}

/// Execution mode for a node
///
/// This is a re-trigger policy for the editor, not a scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Re-demanded whenever an upstream input changes
    Reactive,
    /// Runs only on explicit trigger
    Manual,
    /// Emits partial output chunks while running, then one completion
    Stream,
}

/// Definition of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique type identifier (e.g., "llm-inference")
    pub node_type: String,
    /// Category for grouping in UI
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Input port definitions, in display order
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions, in display order
    pub outputs: Vec<PortDefinition>,
    /// Execution mode
    pub execution_mode: ExecutionMode,
}

impl NodeDefinition {
    /// Find an input port by id
    pub fn input(&self, port_id: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    /// Find an output port by id
    pub fn output(&self, port_id: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.id == port_id)
    }
}

/// Canvas position of a node. The engine never interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An edge connecting two ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Source port ID
    pub source_handle: PortId,
    /// Target node ID
    pub target: NodeId,
    /// Target port ID
    pub target_handle: PortId,
}

impl GraphEdge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node type (references a NodeDefinition)
    pub node_type: String,
    /// Configured literal values, keyed by port or setting name
    #[serde(default)]
    pub data: serde_json::Value,
    /// Position in the UI
    #[serde(default)]
    pub position: Position,
}

impl GraphNode {
    /// Create a node with no data at the origin
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: serde_json::Value::Null,
            position: Position::default(),
        }
    }

    /// Set the node's literal data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Look up a literal value in the node's data
    pub fn data_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_object().and_then(|obj| obj.get(key))
    }
}

/// A complete workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Unique identifier for this graph
    #[serde(default)]
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Nodes in the graph
    pub nodes: Vec<GraphNode>,
    /// Edges connecting nodes
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Find an edge by ID
    pub fn find_edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Check if there's an edge connecting to a specific input port
    pub fn has_edge_to(&self, node_id: &str, port_id: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.target == node_id && e.target_handle == port_id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Get the distinct IDs of nodes that this node depends on, in edge order
    pub fn get_dependencies(&self, node_id: &str) -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = Vec::new();
        for edge in self.incoming_edges(node_id) {
            if !deps.contains(&edge.source) {
                deps.push(edge.source.clone());
            }
        }
        deps
    }

    /// Get the distinct IDs of nodes that depend on this node, in edge order
    pub fn get_dependents(&self, node_id: &str) -> Vec<NodeId> {
        let mut dependents: Vec<NodeId> = Vec::new();
        for edge in self.outgoing_edges(node_id) {
            if !dependents.contains(&edge.target) {
                dependents.push(edge.target.clone());
            }
        }
        dependents
    }

    /// Every node reachable from `node_id` by following outgoing edges,
    /// including `node_id` itself, in discovery order.
    pub fn downstream_closure(&self, node_id: &str) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| graph.get_dependents(id))
    }

    /// Every node `node_id` transitively depends on, including itself
    pub fn upstream_closure(&self, node_id: &str) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| graph.get_dependencies(id))
    }

    fn walk(&self, start: &str, next: impl Fn(&Self, &str) -> Vec<NodeId>) -> Vec<NodeId> {
        let mut seen = std::collections::HashSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            queue.extend(next(self, &id));
            order.push(id);
        }
        order
    }
}

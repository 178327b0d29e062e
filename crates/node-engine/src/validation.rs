//! Graph validation for workflow graphs
//!
//! Validates graph structure, port references and types, required
//! connections, and detects cycles. Validation is total: every problem
//! found is reported, and a run is rejected before any node executes.

use std::collections::{HashMap, HashSet};

use crate::registry::NodeRegistry;
use crate::scheduler::compute_levels;
use crate::types::{NodeId, WorkflowGraph};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Cycle detected in the graph
    CycleDetected { node_ids: Vec<NodeId> },
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// A node has an unknown type (not in registry)
    UnknownNodeType { node_id: String, node_type: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge references a port the node's definition does not declare
    UnknownPort {
        edge_id: String,
        node_id: String,
        port_id: String,
    },
    /// More than one edge terminates at a port that accepts a single connection
    MultipleConnections { node_id: String, port_id: String },
    /// An edge connects incompatible port types
    IncompatiblePortTypes {
        edge_id: String,
        source_type: String,
        target_type: String,
    },
    /// A required input port is neither connected nor set in node data
    MissingRequiredInput { node_id: String, port_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected { node_ids } => {
                write!(f, "Cycle detected between nodes: {}", node_ids.join(", "))
            }
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::UnknownPort {
                edge_id,
                node_id,
                port_id,
            } => write!(
                f,
                "Edge '{}' references undeclared port '{}' on node '{}'",
                edge_id, port_id, node_id
            ),
            Self::MultipleConnections { node_id, port_id } => write!(
                f,
                "Input '{}' on node '{}' accepts a single connection",
                port_id, node_id
            ),
            Self::IncompatiblePortTypes {
                edge_id,
                source_type,
                target_type,
            } => write!(
                f,
                "Edge '{}' connects incompatible types: {} -> {}",
                edge_id, source_type, target_type
            ),
            Self::MissingRequiredInput { node_id, port_id } => write!(
                f,
                "Required input '{}' on node '{}' is not connected",
                port_id, node_id
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Every validation error found for one graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// The nodes named by a cycle error, if one was found
    pub fn cycle(&self) -> Option<&[NodeId]> {
        self.0.iter().find_map(|e| match e {
            ValidationError::CycleDetected { node_ids } => Some(node_ids.as_slice()),
            _ => None,
        })
    }

    /// `Ok(())` when empty, otherwise the errors themselves
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a whole workflow graph
///
/// Returns all validation errors found (not just the first).
/// Pass a registry to enable node type, port and required-input checks.
pub fn validate_workflow(graph: &WorkflowGraph, registry: Option<&NodeRegistry>) -> ValidationErrors {
    validate_scoped(graph, registry, None)
}

/// Validate only the given nodes and the edges terminating at them
///
/// Used before demand-driven evaluation, where only the upstream closure
/// of the requested node will run.
pub fn validate_nodes(
    graph: &WorkflowGraph,
    registry: Option<&NodeRegistry>,
    node_ids: &[NodeId],
) -> ValidationErrors {
    let scope: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    validate_scoped(graph, registry, Some(&scope))
}

fn validate_scoped(
    graph: &WorkflowGraph,
    registry: Option<&NodeRegistry>,
    scope: Option<&HashSet<&str>>,
) -> ValidationErrors {
    let in_scope = |id: &str| scope.map_or(true, |s| s.contains(id));
    let mut errors = Vec::new();

    validate_node_ids(graph, &in_scope, &mut errors);
    validate_edge_references(graph, &in_scope, &mut errors);
    detect_cycles(graph, &in_scope, &mut errors);

    if let Some(reg) = registry {
        validate_node_types(graph, reg, &in_scope, &mut errors);
        validate_ports(graph, reg, &in_scope, &mut errors);
        validate_required_inputs(graph, reg, &in_scope, &mut errors);
    }

    ValidationErrors(errors)
}

fn validate_node_ids(
    graph: &WorkflowGraph,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) && in_scope(&node.id) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(
    graph: &WorkflowGraph,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in graph.edges.iter().filter(|e| in_scope(&e.target)) {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                errors.push(ValidationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
}

fn detect_cycles(
    graph: &WorkflowGraph,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    if let Err(cycle) = compute_levels(graph) {
        let node_ids: Vec<NodeId> = cycle.into_iter().filter(|id| in_scope(id)).collect();
        if !node_ids.is_empty() {
            errors.push(ValidationError::CycleDetected { node_ids });
        }
    }
}

/// Check that all nodes have known types in the registry
fn validate_node_types(
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    for node in graph.nodes.iter().filter(|n| in_scope(&n.id)) {
        if !registry.has_node_type(&node.node_type) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}

/// Check declared ports, connection multiplicity and type compatibility
fn validate_ports(
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    let definition_of = |node_id: &str| {
        graph
            .find_node(node_id)
            .and_then(|n| registry.get_definition(&n.node_type))
    };

    let mut connections: HashMap<(&str, &str), usize> = HashMap::new();

    for edge in graph.edges.iter().filter(|e| in_scope(&e.target)) {
        let source_def = definition_of(&edge.source);
        let target_def = definition_of(&edge.target);

        let source_port = source_def.and_then(|d| d.output(&edge.source_handle));
        if source_def.is_some() && source_port.is_none() {
            errors.push(ValidationError::UnknownPort {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
                port_id: edge.source_handle.clone(),
            });
        }

        let target_port = target_def.and_then(|d| d.input(&edge.target_handle));
        if target_def.is_some() && target_port.is_none() {
            errors.push(ValidationError::UnknownPort {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
                port_id: edge.target_handle.clone(),
            });
        }

        if let (Some(source), Some(target)) = (source_port, target_port) {
            if !source.data_type.is_compatible_with(&target.data_type) {
                errors.push(ValidationError::IncompatiblePortTypes {
                    edge_id: edge.id.clone(),
                    source_type: source.data_type.to_string(),
                    target_type: target.data_type.to_string(),
                });
            }

            let count = connections
                .entry((edge.target.as_str(), edge.target_handle.as_str()))
                .or_insert(0);
            *count += 1;
            if *count == 2 && !target.multiple {
                errors.push(ValidationError::MultipleConnections {
                    node_id: edge.target.clone(),
                    port_id: edge.target_handle.clone(),
                });
            }
        }
    }
}

/// Check that required inputs are connected or have a literal in node data
fn validate_required_inputs(
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
    in_scope: &dyn Fn(&str) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    for node in graph.nodes.iter().filter(|n| in_scope(&n.id)) {
        let Some(definition) = registry.get_definition(&node.node_type) else {
            continue;
        };
        for port in definition.inputs.iter().filter(|p| p.required) {
            if !graph.has_edge_to(&node.id, &port.id) && node.data_value(&port.id).is_none() {
                errors.push(ValidationError::MissingRequiredInput {
                    node_id: node.id.clone(),
                    port_id: port.id.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::registry::NodeRegistry;

    fn registry() -> NodeRegistry {
        NodeRegistry::with_builtins().unwrap()
    }

    #[test]
    fn test_valid_graph() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .with_data(serde_json::json!({"text": "hello"}))
            .add_node("b", "text-output", (100.0, 0.0))
            .add_edge("a", "text", "b", "text")
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert!(errors.is_empty(), "Expected no errors, got: {}", errors);
    }

    #[test]
    fn test_detect_cycle_names_nodes() {
        let graph = WorkflowBuilder::new("wf", "Cyclic")
            .add_node("src", "text-input", (0.0, 0.0))
            .add_node("a", "merge", (0.0, 0.0))
            .add_node("b", "merge", (100.0, 0.0))
            .add_node("tail", "text-output", (200.0, 0.0))
            .add_edge("src", "text", "a", "inputs")
            .add_edge("a", "merged", "b", "inputs")
            .add_edge("b", "merged", "a", "inputs")
            .add_edge("b", "merged", "tail", "text")
            .build();

        let errors = validate_workflow(&graph, None);
        let mut cycle = errors.cycle().expect("cycle reported").to_vec();
        cycle.sort();
        assert_eq!(cycle, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_node_type() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "unknown-type", (0.0, 0.0))
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownNodeType { .. })));
    }

    #[test]
    fn test_missing_required_input() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("b", "text-output", (100.0, 0.0))
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert_eq!(
            errors.0,
            vec![ValidationError::MissingRequiredInput {
                node_id: "b".to_string(),
                port_id: "text".to_string(),
            }]
        );
    }

    #[test]
    fn test_required_input_satisfied_by_literal() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("b", "text-output", (100.0, 0.0))
            .with_data(serde_json::json!({"text": "literal"}))
            .build();

        assert!(validate_workflow(&graph, Some(&registry())).is_empty());
    }

    #[test]
    fn test_edge_references_missing_node() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .add_edge("a", "text", "missing", "text")
            .build();

        let errors = validate_workflow(&graph, None);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownNode { node_id, .. } if node_id == "missing")));
    }

    #[test]
    fn test_undeclared_port() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .add_node("b", "text-output", (100.0, 0.0))
            .add_edge("a", "nope", "b", "text")
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::UnknownPort { port_id, .. } if port_id == "nope"
        )));
    }

    #[test]
    fn test_single_connection_port() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .add_node("b", "text-input", (0.0, 50.0))
            .add_node("c", "text-output", (100.0, 0.0))
            .add_edge("a", "text", "c", "text")
            .add_edge("b", "text", "c", "text")
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MultipleConnections { .. })));
    }

    #[test]
    fn test_multiple_port_accepts_many() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .add_node("b", "text-input", (0.0, 50.0))
            .add_node("m", "merge", (100.0, 0.0))
            .add_edge("a", "text", "m", "inputs")
            .add_edge("b", "text", "m", "inputs")
            .build();

        assert!(validate_workflow(&graph, Some(&registry())).is_empty());
    }

    #[test]
    fn test_incompatible_types() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("flag", "conditional", (0.0, 0.0))
            .with_data(serde_json::json!({"condition": true}))
            .add_node("n", "number-input", (0.0, 0.0))
            .add_node("x", "conditional", (100.0, 0.0))
            .add_edge("n", "value", "x", "condition")
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::IncompatiblePortTypes { .. })));
    }

    #[test]
    fn test_scoped_validation_ignores_other_branches() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "text-input", (0.0, 0.0))
            .add_node("b", "text-output", (100.0, 0.0))
            .add_edge("a", "text", "b", "text")
            .add_node("orphan", "text-output", (0.0, 100.0))
            .build();

        let reg = registry();
        assert!(!validate_workflow(&graph, Some(&reg)).is_empty());
        let scoped = validate_nodes(&graph, Some(&reg), &["a".to_string(), "b".to_string()]);
        assert!(scoped.is_empty(), "{}", scoped);
    }

    #[test]
    fn test_collects_multiple_errors() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "unknown-type-1", (0.0, 0.0))
            .add_node("b", "unknown-type-2", (100.0, 0.0))
            .add_edge("a", "out", "b", "in")
            .add_edge("b", "out", "a", "in")
            .build();

        let errors = validate_workflow(&graph, Some(&registry()));
        // Should have both cycle and unknown type errors
        assert!(errors.len() >= 3);
        assert!(errors.cycle().is_some());
    }
}

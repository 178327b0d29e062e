//! Node type registry
//!
//! Maps node type strings to their [`NodeDefinition`] and the [`Task`]
//! that executes them. Built-in types come from the explicit list in
//! [`tasks::builtin_nodes`](crate::tasks::builtin_nodes); registering the
//! same type twice is an error, so startup fails deterministically instead
//! of silently keeping whichever registration ran last.
//!
//! # Usage
//!
//! ```
//! use node_engine::{NodeOutputs, NodeRegistry};
//!
//! let mut registry = NodeRegistry::with_builtins().unwrap();
//!
//! // Bind the inference stub to host-owned logic
//! registry.register_callback("llm-inference", |_call| async move {
//!     let mut outputs = NodeOutputs::new();
//!     outputs.insert("response".to_string(), serde_json::json!("..."));
//!     Ok(outputs)
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;

use crate::error::{NodeEngineError, Result};
use crate::task::{HostCall, Task, TaskOutcome};
use crate::tasks::builtin_nodes;
use crate::types::{NodeCategory, NodeDefinition};

/// A registration entry combining the definition with its bound task
struct RegistryEntry {
    definition: NodeDefinition,
    task: Task,
}

/// Registry of node types with their definitions and tasks
///
/// # Composability
///
/// Registries can be composed by merging, as long as the node types
/// do not overlap:
/// ```ignore
/// let mut registry = NodeRegistry::with_builtins()?;
/// registry.merge(plugin_registry)?;
/// ```
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in node type
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for (definition, task) in builtin_nodes() {
            registry.register(definition, task)?;
        }
        log::debug!("Registered {} built-in node types", registry.len());
        Ok(registry)
    }

    /// Register a node type with its task
    ///
    /// Fails with `DuplicateNodeType` if the type is already known.
    pub fn register(&mut self, definition: NodeDefinition, task: Task) -> Result<()> {
        if self.entries.contains_key(&definition.node_type) {
            return Err(NodeEngineError::DuplicateNodeType(definition.node_type));
        }
        self.entries.insert(
            definition.node_type.clone(),
            RegistryEntry { definition, task },
        );
        Ok(())
    }

    /// Register a new node type whose behavior is a host callback
    pub fn register_host_node<F, Fut, O>(&mut self, definition: NodeDefinition, callback: F) -> Result<()>
    where
        F: Fn(HostCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<TaskOutcome> + 'static,
    {
        self.register(definition, Task::host(callback))
    }

    /// Rebind an already registered node type to a host callback
    ///
    /// The definition is kept; only the task changes. Returns `false`
    /// (and binds nothing) when the node type is unknown.
    pub fn register_callback<F, Fut, O>(&mut self, node_type: &str, callback: F) -> bool
    where
        F: Fn(HostCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<TaskOutcome> + 'static,
    {
        match self.entries.get_mut(node_type) {
            Some(entry) => {
                entry.task = Task::host(callback);
                log::debug!("Bound host callback for node type '{}'", node_type);
                true
            }
            None => {
                log::warn!("Cannot bind callback: node type '{}' is not registered", node_type);
                false
            }
        }
    }

    /// Get the definition for a node type
    pub fn get_definition(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.entries.get(node_type).map(|e| &e.definition)
    }

    /// Get the task bound to a node type
    pub fn get_task(&self, node_type: &str) -> Option<Task> {
        self.entries.get(node_type).map(|e| e.task.clone())
    }

    /// All definitions, sorted by category then label
    ///
    /// Categories compare in declaration order of [`NodeCategory`] (input,
    /// processing, control, tool, output), which is the order a node palette
    /// presents them in. It is not alphabetical.
    pub fn all_definitions(&self) -> Vec<&NodeDefinition> {
        let mut definitions: Vec<&NodeDefinition> =
            self.entries.values().map(|e| &e.definition).collect();
        definitions.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.node_type.cmp(&b.node_type))
        });
        definitions
    }

    /// Get definitions grouped by category
    pub fn definitions_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeDefinition>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeDefinition>> = HashMap::new();
        for definition in self.all_definitions() {
            grouped.entry(definition.category).or_default().push(definition);
        }
        grouped
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// Whether the node type is currently bound to a host callback
    pub fn is_host_bound(&self, node_type: &str) -> bool {
        self.entries
            .get(node_type)
            .map_or(false, |e| e.task.is_host_bound())
    }

    /// List all registered node type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Fails without modifying `self` if any node type overlaps.
    pub fn merge(&mut self, other: NodeRegistry) -> Result<()> {
        if let Some(duplicate) = other.entries.keys().find(|k| self.entries.contains_key(*k)) {
            return Err(NodeEngineError::DuplicateNodeType(duplicate.clone()));
        }
        self.entries.extend(other.entries);
        Ok(())
    }
}

//! Demand-driven lazy evaluation engine
//!
//! This module implements pull-based lazy evaluation with version-tracked
//! caching. Instead of eagerly propagating dirty flags forward, we
//! traverse dependencies backward from requested outputs.
//!
//! # Key Concepts
//!
//! - **Version tracking**: every edit bumps the edited node's own version,
//!   drawn from a single global counter
//! - **Fingerprints**: a node's fingerprint is a BLAKE3 digest over its id,
//!   type, data and own version plus the sorted digests of its incoming
//!   edges, each of which covers the upstream fingerprint. Any upstream
//!   change therefore changes every downstream fingerprint.
//! - **Cache validity**: a cached output is reused only while the node's
//!   current fingerprint equals the one it was computed under
//! - **Coalescing**: concurrent demands for the same node and fingerprint
//!   share a single in-flight execution
//! - **Failures are never cached**: an error leaves the previous entry alone.
//!   A panicking task is reported as an ordinary failure.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::registry::NodeRegistry;
use crate::task::{NodeInputs, NodeOutputs, TaskOutcome};
use crate::tasks::ContextKeys;
use crate::types::{GraphNode, NodeDefinition, NodeId, WorkflowGraph};
use crate::validation::{ValidationError, ValidationErrors};

/// Summary of a node's upstream state
pub type Fingerprint = blake3::Hash;

/// Engine-owned execution status of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Aborted,
    WaitingForInput,
}

/// Cached output for a node with the fingerprint it was computed under
#[derive(Debug, Clone)]
pub struct CachedOutput {
    pub fingerprint: Fingerprint,
    pub outputs: Arc<NodeOutputs>,
}

/// Result of demanding a node
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// The node's outputs, shared with the cache
    Ready(Arc<NodeOutputs>),
    /// `node_id` (the demanded node or one of its ancestors) is waiting
    /// for user input, so nothing downstream of it could run
    Waiting {
        node_id: NodeId,
        prompt: Option<String>,
    },
}

impl Evaluation {
    pub fn outputs(&self) -> Option<&Arc<NodeOutputs>> {
        match self {
            Self::Ready(outputs) => Some(outputs),
            Self::Waiting { .. } => None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting { .. })
    }
}

/// Everything one demand call tree needs, owned so it can be shared
/// across coalesced futures
#[derive(Clone)]
pub struct EvaluationScope {
    pub graph: Arc<WorkflowGraph>,
    pub registry: Arc<NodeRegistry>,
    pub context: ExecutionContext,
}

impl EvaluationScope {
    pub fn new(graph: Arc<WorkflowGraph>, registry: Arc<NodeRegistry>, context: ExecutionContext) -> Self {
        Self {
            graph,
            registry,
            context,
        }
    }
}

type SharedEvaluation = Shared<BoxFuture<'static, Result<Evaluation>>>;

#[derive(Default)]
struct DemandState {
    /// Own version of each node (bumped when the node is edited)
    versions: HashMap<NodeId, u64>,
    /// Global version counter
    global_version: u64,
    cache: HashMap<NodeId, CachedOutput>,
    in_flight: HashMap<NodeId, (Fingerprint, SharedEvaluation)>,
    status: HashMap<NodeId, NodeStatus>,
    executions: HashMap<NodeId, u64>,
}

/// Demand-driven lazy evaluation engine
///
/// Cloning yields another handle onto the same cache.
#[derive(Clone, Default)]
pub struct DemandEngine {
    state: Arc<Mutex<DemandState>>,
}

impl DemandEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as modified (externally changed, e.g., user edited data)
    ///
    /// This bumps the node's own version and drops its cache entry. Downstream
    /// entries become unreachable because their fingerprints change.
    pub fn mark_modified(&self, node_id: &str) {
        let mut state = self.state.lock();
        state.global_version += 1;
        let version = state.global_version;
        state.versions.insert(node_id.to_string(), version);
        state.cache.remove(node_id);
        log::debug!("Node {} modified, version {}", node_id, version);
    }

    /// Forget everything known about a node
    pub fn remove_node(&self, node_id: &str) {
        let mut state = self.state.lock();
        state.versions.remove(node_id);
        state.cache.remove(node_id);
        state.in_flight.remove(node_id);
        state.status.remove(node_id);
        state.executions.remove(node_id);
    }

    /// Clear the entire cache, keeping versions
    pub fn clear_cache(&self) {
        self.state.lock().cache.clear();
    }

    /// Current own version of a node (0 if never edited)
    pub fn version(&self, node_id: &str) -> u64 {
        self.state.lock().versions.get(node_id).copied().unwrap_or(0)
    }

    /// Fingerprint of a node under the current graph and versions
    pub fn fingerprint(&self, graph: &WorkflowGraph, node_id: &str) -> Result<Fingerprint> {
        let fingerprints = self.fingerprints(graph, node_id)?;
        fingerprints
            .get(node_id)
            .copied()
            .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))
    }

    /// Cached outputs of a node, if still valid for `graph`
    pub fn get_cached(&self, graph: &WorkflowGraph, node_id: &str) -> Option<Arc<NodeOutputs>> {
        let fingerprint = self.fingerprint(graph, node_id).ok()?;
        let state = self.state.lock();
        state
            .cache
            .get(node_id)
            .filter(|c| c.fingerprint == fingerprint)
            .map(|c| c.outputs.clone())
    }

    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.state.lock().status.get(node_id).copied().unwrap_or_default()
    }

    /// How many times a node's task has actually run
    pub fn execution_count(&self, node_id: &str) -> u64 {
        self.state.lock().executions.get(node_id).copied().unwrap_or(0)
    }

    /// Get statistics about the cache
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            cached_nodes: state.cache.len(),
            total_versions: state.versions.len(),
            global_version: state.global_version,
            total_executions: state.executions.values().sum(),
        }
    }

    /// Compute a node's outputs, running only what is stale
    ///
    /// A valid cache entry is returned with no side effects at all.
    /// Otherwise every dependency is demanded first, then the node's task
    /// runs and its outputs are cached under the new fingerprint.
    pub async fn demand(&self, scope: &EvaluationScope, node_id: &str) -> Result<Evaluation> {
        let fingerprints = Arc::new(self.fingerprints(&scope.graph, node_id)?);
        self.demand_with(scope.clone(), fingerprints, node_id.to_string())
            .await
    }

    fn demand_with(
        &self,
        scope: EvaluationScope,
        fingerprints: Arc<HashMap<NodeId, Fingerprint>>,
        node_id: NodeId,
    ) -> BoxFuture<'static, Result<Evaluation>> {
        let engine = self.clone();
        async move {
            let fingerprint = fingerprints
                .get(&node_id)
                .copied()
                .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.clone()))?;

            let shared = {
                let mut state = engine.state.lock();
                if let Some(cached) = state.cache.get(&node_id) {
                    if cached.fingerprint == fingerprint {
                        log::debug!("Cache hit for node {}", node_id);
                        return Ok(Evaluation::Ready(cached.outputs.clone()));
                    }
                }

                match state.in_flight.get(&node_id) {
                    Some((running, shared)) if *running == fingerprint => {
                        log::debug!("Joining in-flight execution of node {}", node_id);
                        shared.clone()
                    }
                    _ => {
                        let shared = engine
                            .clone()
                            .evaluate(scope, fingerprints, node_id.clone(), fingerprint)
                            .boxed()
                            .shared();
                        state
                            .in_flight
                            .insert(node_id.clone(), (fingerprint, shared.clone()));
                        shared
                    }
                }
            };

            shared.await
        }
        .boxed()
    }

    /// Demand dependencies, run the task, commit the result
    async fn evaluate(
        self,
        scope: EvaluationScope,
        fingerprints: Arc<HashMap<NodeId, Fingerprint>>,
        node_id: NodeId,
        fingerprint: Fingerprint,
    ) -> Result<Evaluation> {
        let _in_flight = InFlightGuard {
            state: self.state.clone(),
            node_id: node_id.clone(),
            fingerprint,
        };

        // A panic that escapes the task (a panicking event sink, say) still
        // has to reach every coalesced caller as an error
        let result = match AssertUnwindSafe(self.evaluate_uncommitted(&scope, &fingerprints, &node_id))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&*panic);
                log::error!("Evaluation of node {} panicked: {}", node_id, message);
                self.set_status(&node_id, NodeStatus::Error);
                Err(NodeEngineError::ExecutionFailed(format!(
                    "Node '{}' panicked: {}",
                    node_id, message
                )))
            }
        };

        if let Ok(Evaluation::Ready(outputs)) = &result {
            self.state.lock().cache.insert(
                node_id,
                CachedOutput {
                    fingerprint,
                    outputs: outputs.clone(),
                },
            );
        }
        result
    }

    async fn evaluate_uncommitted(
        &self,
        scope: &EvaluationScope,
        fingerprints: &Arc<HashMap<NodeId, Fingerprint>>,
        node_id: &str,
    ) -> Result<Evaluation> {
        let node = scope
            .graph
            .find_node(node_id)
            .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;

        let dependencies = scope.graph.get_dependencies(node_id);
        let evaluations = try_join_all(
            dependencies
                .iter()
                .map(|dep| self.demand_with(scope.clone(), fingerprints.clone(), dep.clone())),
        )
        .await?;

        let mut upstream: HashMap<NodeId, Arc<NodeOutputs>> = HashMap::new();
        for (dep, evaluation) in dependencies.into_iter().zip(evaluations) {
            match evaluation {
                Evaluation::Ready(outputs) => {
                    upstream.insert(dep, outputs);
                }
                waiting @ Evaluation::Waiting { .. } => return Ok(waiting),
            }
        }

        let ctx = &scope.context;
        if ctx.is_aborted() {
            self.set_status(node_id, NodeStatus::Aborted);
            return Err(NodeEngineError::Cancelled);
        }

        let task = scope
            .registry
            .get_task(&node.node_type)
            .ok_or_else(|| NodeEngineError::UnknownNodeType(node.node_type.clone()))?;
        let definition = scope.registry.get_definition(&node.node_type);
        let inputs = resolve_inputs(&scope.graph, node, definition, &upstream);

        {
            let mut state = self.state.lock();
            state.status.insert(node_id.to_string(), NodeStatus::Running);
            *state.executions.entry(node_id.to_string()).or_insert(0) += 1;
        }
        ctx.events().node_started(node_id, &node.node_type);
        log::debug!("Executing node {} ({})", node_id, node.node_type);

        let outcome = match AssertUnwindSafe(task.run(node_id, &node.node_type, inputs, ctx))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(NodeEngineError::ExecutionFailed(format!(
                "Node '{}' panicked: {}",
                node_id,
                panic_message(&*panic)
            ))),
        };

        match outcome {
            Ok(TaskOutcome::Completed(outputs)) => {
                for (port, value) in &outputs {
                    ctx.set_value(&ContextKeys::output(node_id, port), value.clone())
                        .await;
                }
                self.set_status(node_id, NodeStatus::Success);
                ctx.events().node_completed(node_id, outputs.clone());
                Ok(Evaluation::Ready(Arc::new(outputs)))
            }
            Ok(TaskOutcome::WaitingForInput { prompt }) => {
                self.set_status(node_id, NodeStatus::WaitingForInput);
                ctx.events().waiting_for_input(node_id, prompt.clone());
                Ok(Evaluation::Waiting {
                    node_id: node_id.to_string(),
                    prompt,
                })
            }
            Err(NodeEngineError::Cancelled) => {
                self.set_status(node_id, NodeStatus::Aborted);
                ctx.events().node_error(node_id, "Cancelled");
                Err(NodeEngineError::Cancelled)
            }
            Err(e) => {
                log::warn!("Node {} failed: {}", node_id, e);
                self.set_status(node_id, NodeStatus::Error);
                ctx.events().node_error(node_id, e.to_string());
                Err(e)
            }
        }
    }

    fn set_status(&self, node_id: &str, status: NodeStatus) {
        self.state.lock().status.insert(node_id.to_string(), status);
    }

    /// Fingerprints of `node_id` and everything upstream of it
    ///
    /// Fails with a cycle error if the walk revisits a node on its own path.
    fn fingerprints(&self, graph: &WorkflowGraph, node_id: &str) -> Result<HashMap<NodeId, Fingerprint>> {
        let versions = self.state.lock().versions.clone();
        let mut walk = FingerprintWalk {
            graph,
            versions: &versions,
            memo: HashMap::new(),
            path: Vec::new(),
        };
        walk.visit(node_id)?;
        Ok(walk.memo)
    }
}

/// Clears a node's in-flight entry once its evaluation settles or is dropped
///
/// The cache is written before the guard drops, so a demand arriving in
/// between sees the cached outputs rather than starting a second run.
struct InFlightGuard {
    state: Arc<Mutex<DemandState>>,
    node_id: NodeId,
    fingerprint: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if matches!(state.in_flight.get(&self.node_id), Some((f, _)) if *f == self.fingerprint) {
            state.in_flight.remove(&self.node_id);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

struct FingerprintWalk<'a> {
    graph: &'a WorkflowGraph,
    versions: &'a HashMap<NodeId, u64>,
    memo: HashMap<NodeId, Fingerprint>,
    path: Vec<NodeId>,
}

impl FingerprintWalk<'_> {
    fn visit(&mut self, node_id: &str) -> Result<Fingerprint> {
        if let Some(fingerprint) = self.memo.get(node_id) {
            return Ok(*fingerprint);
        }
        if let Some(start) = self.path.iter().position(|id| id == node_id) {
            let node_ids = self.path[start..].to_vec();
            return Err(NodeEngineError::Validation(ValidationErrors(vec![
                ValidationError::CycleDetected { node_ids },
            ])));
        }

        let node = self
            .graph
            .find_node(node_id)
            .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;

        self.path.push(node_id.to_string());
        let mut edge_digests = Vec::new();
        for edge in self.graph.incoming_edges(node_id) {
            let upstream = self.visit(&edge.source)?;
            let mut hasher = blake3::Hasher::new();
            hash_str(&mut hasher, &edge.source);
            hash_str(&mut hasher, &edge.source_handle);
            hash_str(&mut hasher, &edge.target_handle);
            hasher.update(upstream.as_bytes());
            edge_digests.push(hasher.finalize());
        }
        self.path.pop();

        // Sorting makes the combination independent of edge order
        edge_digests.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

        let mut hasher = blake3::Hasher::new();
        hash_str(&mut hasher, &node.id);
        hash_str(&mut hasher, &node.node_type);
        hasher.update(&self.versions.get(node_id).copied().unwrap_or(0).to_le_bytes());
        hasher.update(&serde_json::to_vec(&node.data).unwrap_or_default());
        for digest in &edge_digests {
            hasher.update(digest.as_bytes());
        }
        let fingerprint = hasher.finalize();

        self.memo.insert(node_id.to_string(), fingerprint);
        Ok(fingerprint)
    }
}

/// Length-prefixed so adjacent strings cannot run together
fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Build a node's inputs: literals from its data, overridden by connections
///
/// Ports declared `multiple` collect every connected value into an array,
/// in edge order.
pub fn resolve_inputs(
    graph: &WorkflowGraph,
    node: &GraphNode,
    definition: Option<&NodeDefinition>,
    upstream: &HashMap<NodeId, Arc<NodeOutputs>>,
) -> NodeInputs {
    let mut inputs = NodeInputs::new();
    if let Some(data) = node.data.as_object() {
        for (key, value) in data {
            inputs.insert(key.clone(), value.clone());
        }
    }

    let mut collected: Vec<(String, Vec<serde_json::Value>)> = Vec::new();
    for edge in graph.incoming_edges(&node.id) {
        let value = upstream
            .get(&edge.source)
            .and_then(|outputs| outputs.get(&edge.source_handle))
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let multiple = definition
            .and_then(|d| d.input(&edge.target_handle))
            .map_or(false, |p| p.multiple);
        if !multiple {
            inputs.insert(edge.target_handle.clone(), value);
            continue;
        }
        match collected.iter_mut().find(|(port, _)| *port == edge.target_handle) {
            Some((_, values)) => values.push(value),
            None => collected.push((edge.target_handle.clone(), vec![value])),
        }
    }
    for (port, values) in collected {
        inputs.insert(port, serde_json::Value::Array(values));
    }
    inputs
}

/// Statistics about the demand engine's cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of nodes with cached outputs
    pub cached_nodes: usize,
    /// Number of nodes with version tracking
    pub total_versions: usize,
    /// Global version counter
    pub global_version: u64,
    /// Task runs since the engine was created
    pub total_executions: u64,
}

//! Execution scheduler
//!
//! Groups nodes into levels with Kahn's algorithm and runs the levels in
//! sequence, every node of a level concurrently. Each node is evaluated
//! through the [`DemandEngine`], so cached results are reused and a node
//! never starts before its dependencies have committed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use crate::context::ExecutionContext;
use crate::engine::{DemandEngine, Evaluation, EvaluationScope};
use crate::error::{NodeEngineError, Result};
use crate::events::WorkflowEvent;
use crate::registry::NodeRegistry;
use crate::task::NodeOutputs;
use crate::types::{ExecutionMode, NodeId, WorkflowGraph};
use crate::validation::{validate_nodes, validate_workflow, ValidationError, ValidationErrors};

/// Assign every node to a level
///
/// Level 0 holds the nodes without dependencies; each following level
/// holds the nodes whose dependencies all sit in earlier levels. Within a
/// level nodes keep their order in `graph.nodes`, so the result is
/// deterministic.
///
/// On a cycle returns `Err` with the ids of the nodes on cycles. Nodes that
/// are merely downstream of a cycle are not named.
pub fn compute_levels(graph: &WorkflowGraph) -> std::result::Result<Vec<Vec<NodeId>>, Vec<NodeId>> {
    let order: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen_edges: HashSet<(&str, &str)> = HashSet::new();
    for node in &graph.nodes {
        indegree.entry(node.id.as_str()).or_insert(0);
    }
    for edge in &graph.edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if !order.contains_key(source) || !order.contains_key(target) {
            continue;
        }
        if seen_edges.insert((source, target)) {
            *indegree.entry(target).or_insert(0) += 1;
            dependents.entry(source).or_default().push(target);
        }
    }

    let mut levels: Vec<Vec<NodeId>> = Vec::new();
    let mut current: Vec<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| indegree.get(id) == Some(&0))
        .collect();
    let mut placed = HashSet::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for id in &current {
            placed.insert(*id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        levels.push(current.iter().map(|id| id.to_string()).collect());
        next.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
        next.dedup();
        current = next;
    }

    if placed.len() == order.len() {
        return Ok(levels);
    }

    // Peel off nodes that only lead out of the cycle region
    let mut remaining: HashSet<&str> = order.keys().copied().filter(|id| !placed.contains(id)).collect();
    loop {
        let sinks: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| {
                !dependents
                    .get(id)
                    .into_iter()
                    .flatten()
                    .any(|d| remaining.contains(d))
            })
            .collect();
        if sinks.is_empty() {
            break;
        }
        for id in sinks {
            remaining.remove(id);
        }
    }

    let mut cycle: Vec<&str> = remaining.into_iter().collect();
    cycle.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
    Err(cycle.into_iter().map(str::to_string).collect())
}

/// Nodes to re-run after `changed` was edited
///
/// Follows outgoing edges from each changed node. The walk does not pass
/// through Manual nodes other than the changed ones themselves.
pub fn dirty_set(graph: &WorkflowGraph, registry: &NodeRegistry, changed: &[NodeId]) -> Vec<NodeId> {
    let is_manual = |id: &str| {
        graph
            .find_node(id)
            .and_then(|n| registry.get_definition(&n.node_type))
            .map_or(false, |d| d.execution_mode == ExecutionMode::Manual)
    };

    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut dirty = Vec::new();
    let mut queue: VecDeque<NodeId> = changed
        .iter()
        .filter(|id| graph.find_node(id).is_some())
        .cloned()
        .collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if is_manual(&id) && !changed.contains(&id) {
            continue;
        }
        queue.extend(graph.get_dependents(&id));
        dirty.push(id);
    }
    dirty
}

/// Source of consistent graph snapshots
///
/// The scheduler takes a fresh snapshot before each level, so edits made
/// while a level runs apply from the next level on.
pub trait GraphSnapshot: Send + Sync {
    fn snapshot(&self) -> Arc<WorkflowGraph>;
}

impl GraphSnapshot for Arc<WorkflowGraph> {
    fn snapshot(&self) -> Arc<WorkflowGraph> {
        self.clone()
    }
}

impl GraphSnapshot for RwLock<Arc<WorkflowGraph>> {
    fn snapshot(&self) -> Arc<WorkflowGraph> {
        self.read().clone()
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Aborted,
    /// Nothing failed, but at least one node is waiting for user input
    WaitingForInput,
}

/// A node that failed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub error: String,
}

/// What a full or incremental run did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub status: RunStatus,
    /// Outputs of every node that produced a result in this run
    pub outputs: HashMap<NodeId, NodeOutputs>,
    pub failed: Vec<NodeFailure>,
    /// Nodes skipped because a dependency failed or is waiting
    pub blocked: Vec<NodeId>,
    pub waiting: Vec<NodeId>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Default)]
struct RunState {
    outputs: HashMap<NodeId, NodeOutputs>,
    failed: Vec<NodeFailure>,
    blocked: Vec<NodeId>,
    waiting: Vec<NodeId>,
    aborted: bool,
}

impl RunState {
    fn is_unusable(&self, node_id: &str) -> bool {
        self.failed.iter().any(|f| f.node_id == node_id)
            || self.blocked.iter().any(|b| b == node_id)
            || self.waiting.iter().any(|w| w == node_id)
    }

    fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Aborted
        } else if !self.failed.is_empty() {
            RunStatus::Failed
        } else if !self.waiting.is_empty() {
            RunStatus::WaitingForInput
        } else {
            RunStatus::Completed
        }
    }
}

/// Runs graphs level by level through a demand engine
pub struct Scheduler {
    engine: DemandEngine,
    registry: Arc<NodeRegistry>,
    max_concurrent_nodes: Option<usize>,
}

impl Scheduler {
    pub fn new(engine: DemandEngine, registry: Arc<NodeRegistry>) -> Self {
        Self {
            engine,
            registry,
            max_concurrent_nodes: None,
        }
    }

    /// Bound the number of nodes of one level running at the same time
    pub fn with_max_concurrent_nodes(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_nodes = limit.filter(|n| *n > 0);
        self
    }

    /// Execute every node of the graph
    ///
    /// The whole graph is validated first; on any validation error the
    /// run is rejected before a single node starts and before `Started`
    /// is emitted.
    pub async fn execute_full(
        &self,
        source: &dyn GraphSnapshot,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionReport> {
        let graph = source.snapshot();
        validate_workflow(&graph, Some(self.registry.as_ref())).into_result()?;
        let levels = compute_levels(&graph).map_err(cycle_error)?;

        log::info!(
            "Starting execution {} of workflow '{}' ({} nodes, {} levels)",
            ctx.execution_id(),
            graph.id,
            graph.nodes.len(),
            levels.len()
        );
        ctx.events().emit(WorkflowEvent::Started {
            workflow_id: graph.id.clone(),
            execution_id: ctx.execution_id().to_string(),
            node_count: graph.nodes.len(),
        });

        let state = self.run_levels(levels, source, ctx).await;
        Ok(self.finish(&graph.id, state, ctx))
    }

    /// Re-execute only what an edit of `changed` made stale
    ///
    /// Everything outside the dirty set is served from the cache when it
    /// is needed at all.
    pub async fn execute_incremental(
        &self,
        source: &dyn GraphSnapshot,
        changed: &[NodeId],
        ctx: &ExecutionContext,
    ) -> Result<ExecutionReport> {
        let graph = source.snapshot();
        let dirty = dirty_set(&graph, &self.registry, changed);

        let mut scope: Vec<NodeId> = Vec::new();
        for id in &dirty {
            for upstream in graph.upstream_closure(id) {
                if !scope.contains(&upstream) {
                    scope.push(upstream);
                }
            }
        }
        validate_nodes(&graph, Some(self.registry.as_ref()), &scope).into_result()?;

        let dirty_lookup: HashSet<&str> = dirty.iter().map(String::as_str).collect();
        let levels: Vec<Vec<NodeId>> = compute_levels(&graph)
            .map_err(cycle_error)?
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .filter(|id| dirty_lookup.contains(id.as_str()))
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect();

        log::info!(
            "Starting incremental execution {} of workflow '{}' ({} dirty nodes)",
            ctx.execution_id(),
            graph.id,
            dirty.len()
        );
        ctx.events().emit(WorkflowEvent::IncrementalExecutionStarted {
            workflow_id: graph.id.clone(),
            execution_id: ctx.execution_id().to_string(),
            tasks: dirty,
        });

        let state = self.run_levels(levels, source, ctx).await;
        Ok(self.finish(&graph.id, state, ctx))
    }

    async fn run_levels(
        &self,
        levels: Vec<Vec<NodeId>>,
        source: &dyn GraphSnapshot,
        ctx: &ExecutionContext,
    ) -> RunState {
        let mut state = RunState::default();
        let semaphore = self
            .max_concurrent_nodes
            .map(|limit| Arc::new(Semaphore::new(limit)));

        for level in levels {
            if ctx.is_aborted() {
                state.aborted = true;
                break;
            }

            let graph = source.snapshot();
            let scope = EvaluationScope::new(graph.clone(), self.registry.clone(), ctx.clone());
            let mut running = JoinSet::new();
            let mut spawned: HashMap<task::Id, NodeId> = HashMap::new();

            for node_id in level {
                if graph.find_node(&node_id).is_none() {
                    log::debug!("Node {} was removed before its level ran", node_id);
                    continue;
                }
                if graph
                    .get_dependencies(&node_id)
                    .iter()
                    .any(|dep| state.is_unusable(dep))
                {
                    state.blocked.push(node_id);
                    continue;
                }
                if ctx.is_aborted() {
                    state.aborted = true;
                    break;
                }

                let engine = self.engine.clone();
                let scope = scope.clone();
                let semaphore = semaphore.clone();
                let spawned_id = node_id.clone();
                let handle = running.spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    let result = engine.demand(&scope, &node_id).await;
                    (node_id, result)
                });
                spawned.insert(handle.id(), spawned_id);
            }

            while let Some(joined) = running.join_next().await {
                match joined {
                    Ok((node_id, Ok(Evaluation::Ready(outputs)))) => {
                        state.outputs.insert(node_id, (*outputs).clone());
                    }
                    Ok((node_id, Ok(Evaluation::Waiting { node_id: waiting, .. }))) => {
                        if waiting == node_id {
                            state.waiting.push(node_id);
                        } else {
                            state.blocked.push(node_id);
                        }
                    }
                    Ok((_, Err(NodeEngineError::Cancelled))) => state.aborted = true,
                    Ok((node_id, Err(e))) => state.failed.push(NodeFailure {
                        node_id,
                        error: e.to_string(),
                    }),
                    Err(e) => {
                        // Recorded under its node so dependents are blocked
                        let node_id = spawned.remove(&e.id()).unwrap_or_default();
                        log::error!("Task for node {} did not finish: {}", node_id, e);
                        state.failed.push(NodeFailure {
                            node_id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if state.aborted {
                break;
            }
        }
        state
    }

    fn finish(&self, workflow_id: &str, state: RunState, ctx: &ExecutionContext) -> ExecutionReport {
        let status = state.status();
        let execution_id = ctx.execution_id().to_string();

        match status {
            RunStatus::Aborted => {
                log::info!("Execution {} cancelled", execution_id);
                ctx.events().emit(WorkflowEvent::Failed {
                    workflow_id: workflow_id.to_string(),
                    execution_id: execution_id.clone(),
                    error: NodeEngineError::Cancelled.to_string(),
                });
            }
            RunStatus::Failed => {
                let error = state
                    .failed
                    .iter()
                    .map(|f| format!("{}: {}", f.node_id, f.error))
                    .collect::<Vec<_>>()
                    .join("; ");
                log::info!("Execution {} failed: {}", execution_id, error);
                ctx.events().emit(WorkflowEvent::Failed {
                    workflow_id: workflow_id.to_string(),
                    execution_id: execution_id.clone(),
                    error,
                });
            }
            RunStatus::Completed | RunStatus::WaitingForInput => {
                log::info!(
                    "Execution {} finished with {} node outputs",
                    execution_id,
                    state.outputs.len()
                );
                ctx.events().emit(WorkflowEvent::Completed {
                    workflow_id: workflow_id.to_string(),
                    execution_id: execution_id.clone(),
                    outputs: state.outputs.clone(),
                });
            }
        }

        ExecutionReport {
            execution_id,
            status,
            outputs: state.outputs,
            failed: state.failed,
            blocked: state.blocked,
            waiting: state.waiting,
        }
    }
}

fn cycle_error(node_ids: Vec<NodeId>) -> NodeEngineError {
    NodeEngineError::Validation(ValidationErrors(vec![ValidationError::CycleDetected { node_ids }]))
}

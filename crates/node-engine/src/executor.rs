//! Workflow session
//!
//! A `WorkflowExecutor` owns one live graph together with everything that
//! evaluates and edits it: the demand engine, the undo history, the node
//! registry and the shared abort signal.
//!
//! The graph lives in an `Arc` behind a single-writer lock. Demands and
//! running levels hold their own snapshots, so an edit made mid-run never
//! touches a level in progress; it applies from the next level on.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::{AbortSignal, ExecutionContext};
use crate::engine::{CacheStats, DemandEngine, Evaluation, EvaluationScope, NodeStatus};
use crate::error::{NodeEngineError, Result};
use crate::events::{EventSink, WorkflowEvent};
use crate::extensions::ExecutorExtensions;
use crate::registry::NodeRegistry;
use crate::scheduler::{ExecutionReport, Scheduler};
use crate::task::NodeOutputs;
use crate::tasks::HumanInputTask;
use crate::types::{GraphEdge, GraphNode, NodeId, Position, WorkflowGraph};
use crate::undo::{UndoRedoState, UndoStack};
use crate::validation::{validate_nodes, ValidationError, ValidationErrors};

/// Nodes an edit touched
#[derive(Debug, Default)]
struct Edit {
    /// Nodes whose type, data or incoming edges changed
    modified: Vec<NodeId>,
    /// Nodes no longer in the graph
    removed: Vec<NodeId>,
}

impl Edit {
    fn modified(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            modified: ids.into_iter().collect(),
            removed: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.removed.is_empty()
    }
}

/// One editable, executable workflow
pub struct WorkflowExecutor {
    execution_id: String,
    graph: RwLock<Arc<WorkflowGraph>>,
    engine: DemandEngine,
    /// Also serializes every writer of `graph`
    history: Mutex<UndoStack>,
    registry: Arc<NodeRegistry>,
    sink: Arc<dyn EventSink>,
    extensions: Arc<ExecutorExtensions>,
    abort: AbortSignal,
    context: ExecutionContext,
    config: EngineConfig,
}

impl WorkflowExecutor {
    pub fn new(
        execution_id: impl Into<String>,
        graph: WorkflowGraph,
        registry: Arc<NodeRegistry>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::with_config(execution_id, graph, registry, sink, EngineConfig::default())
    }

    /// Create a session; the initial graph is the bottom of the undo history
    pub fn with_config(
        execution_id: impl Into<String>,
        graph: WorkflowGraph,
        registry: Arc<NodeRegistry>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Result<Self> {
        let execution_id = execution_id.into();
        let mut history = UndoStack::with_compression_level(config.undo_capacity, config.compression_level);
        history.push(&graph)?;

        let abort = AbortSignal::new();
        let extensions = Arc::new(ExecutorExtensions::new());
        let context = ExecutionContext::new(execution_id.clone(), sink.clone())
            .with_extensions(extensions.clone())
            .with_abort_signal(abort.clone());

        log::debug!(
            "Created workflow session {} for '{}' ({} nodes)",
            execution_id,
            graph.id,
            graph.nodes.len()
        );

        Ok(Self {
            execution_id,
            graph: RwLock::new(Arc::new(graph)),
            engine: DemandEngine::new(),
            history: Mutex::new(history),
            registry,
            sink,
            extensions,
            abort,
            context,
            config,
        })
    }

    /// Attach host resources (service endpoints, project paths, ...)
    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self.context = self.run_context(self.execution_id.clone());
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &DemandEngine {
        &self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Context used by `demand`
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Current graph; cheap, and unaffected by later edits
    pub fn get_graph_snapshot(&self) -> Arc<WorkflowGraph> {
        self.graph.read().clone()
    }

    pub fn undo_redo_state(&self) -> UndoRedoState {
        self.history.lock().state()
    }

    pub fn node_status(&self, node_id: &str) -> NodeStatus {
        self.engine.status(node_id)
    }

    /// Cached outputs of a node, if still valid for the current graph
    pub fn cached_outputs(&self, node_id: &str) -> Option<Arc<NodeOutputs>> {
        self.engine.get_cached(&self.get_graph_snapshot(), node_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.stats()
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    pub fn add_node(&self, node: GraphNode) -> Result<()> {
        if !self.registry.has_node_type(&node.node_type) {
            return Err(NodeEngineError::UnknownNodeType(node.node_type));
        }
        self.commit(move |graph| {
            if graph.find_node(&node.id).is_some() {
                return Err(ValidationErrors(vec![ValidationError::DuplicateNodeId {
                    node_id: node.id,
                }])
                .into());
            }
            let id = node.id.clone();
            graph.nodes.push(node);
            Ok(Edit::modified([id]))
        })
    }

    /// Remove a node and every edge attached to it
    pub fn remove_node(&self, node_id: &str) -> Result<()> {
        self.commit(|graph| {
            let index = graph
                .nodes
                .iter()
                .position(|n| n.id == node_id)
                .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;
            graph.nodes.remove(index);

            let mut dependents = Vec::new();
            graph.edges.retain(|edge| {
                if edge.source == node_id && edge.target != node_id && !dependents.contains(&edge.target) {
                    dependents.push(edge.target.clone());
                }
                edge.source != node_id && edge.target != node_id
            });

            Ok(Edit {
                modified: dependents,
                removed: vec![node_id.to_string()],
            })
        })
    }

    pub fn add_edge(&self, edge: GraphEdge) -> Result<()> {
        self.commit(move |graph| {
            for endpoint in [&edge.source, &edge.target] {
                if graph.find_node(endpoint).is_none() {
                    return Err(NodeEngineError::NodeNotFound(endpoint.clone()));
                }
            }
            if graph.find_edge(&edge.id).is_some() {
                return Err(NodeEngineError::DuplicateEdge(edge.id));
            }
            let target = edge.target.clone();
            graph.edges.push(edge);
            Ok(Edit::modified([target]))
        })
    }

    pub fn remove_edge(&self, edge_id: &str) -> Result<()> {
        self.commit(|graph| {
            let index = graph
                .edges
                .iter()
                .position(|e| e.id == edge_id)
                .ok_or_else(|| NodeEngineError::EdgeNotFound(edge_id.to_string()))?;
            let edge = graph.edges.remove(index);
            Ok(Edit::modified([edge.target]))
        })
    }

    /// Replace a node's literal data
    pub fn update_node_data(&self, node_id: &str, data: serde_json::Value) -> Result<()> {
        self.commit(|graph| {
            let node = graph
                .find_node_mut(node_id)
                .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;
            node.data = data;
            Ok(Edit::modified([node_id.to_string()]))
        })
    }

    /// Move a node on the canvas. Recorded for undo; invalidates nothing.
    pub fn set_node_position(&self, node_id: &str, position: Position) -> Result<()> {
        self.commit(|graph| {
            let node = graph
                .find_node_mut(node_id)
                .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;
            node.position = position;
            Ok(Edit::default())
        })
    }

    /// Answer a human-input node waiting in this session
    pub fn provide_input(&self, node_id: &str, response: impl Into<String>) -> Result<()> {
        let response = response.into();
        self.commit(|graph| {
            let node = graph
                .find_node_mut(node_id)
                .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;
            if !node.data.is_object() {
                node.data = serde_json::json!({});
            }
            if let Some(data) = node.data.as_object_mut() {
                data.insert(
                    HumanInputTask::PORT_USER_RESPONSE.to_string(),
                    serde_json::Value::String(response),
                );
            }
            Ok(Edit::modified([node_id.to_string()]))
        })
    }

    /// Swap in a whole new graph, invalidating only what differs
    pub fn replace_graph(&self, graph: WorkflowGraph) -> Result<()> {
        self.commit(move |live| {
            let edit = diff_graphs(live, &graph);
            *live = graph;
            Ok(edit)
        })
    }

    /// Step back one edit. `None` at the bottom of history.
    pub fn undo(&self) -> Result<Option<Arc<WorkflowGraph>>> {
        let mut history = self.history.lock();
        match history.undo() {
            Some(restored) => Ok(Some(self.restore(restored?))),
            None => Ok(None),
        }
    }

    /// Step forward one edit. `None` at the top of history.
    pub fn redo(&self) -> Result<Option<Arc<WorkflowGraph>>> {
        let mut history = self.history.lock();
        match history.redo() {
            Some(restored) => Ok(Some(self.restore(restored?))),
            None => Ok(None),
        }
    }

    fn commit(&self, edit: impl FnOnce(&mut WorkflowGraph) -> Result<Edit>) -> Result<()> {
        let mut history = self.history.lock();
        let mut graph = WorkflowGraph::clone(&self.graph.read());
        let edit = edit(&mut graph)?;
        history.push(&graph)?;

        let graph = Arc::new(graph);
        *self.graph.write() = graph.clone();
        self.invalidate(&graph, &edit);
        Ok(())
    }

    fn restore(&self, restored: WorkflowGraph) -> Arc<WorkflowGraph> {
        let restored = Arc::new(restored);
        let previous = std::mem::replace(&mut *self.graph.write(), restored.clone());
        let edit = diff_graphs(&previous, &restored);
        self.invalidate(&restored, &edit);
        restored
    }

    fn invalidate(&self, graph: &WorkflowGraph, edit: &Edit) {
        if edit.is_empty() {
            return;
        }
        for id in &edit.removed {
            self.engine.remove_node(id);
        }
        for id in &edit.modified {
            self.engine.mark_modified(id);
        }

        let dirty = dirty_tasks(graph, &edit.modified);
        log::debug!(
            "Graph '{}' modified: {} changed, {} removed, {} dirty",
            graph.id,
            edit.modified.len(),
            edit.removed.len(),
            dirty.len()
        );
        self.context.events().emit(WorkflowEvent::GraphModified {
            workflow_id: graph.id.clone(),
            dirty_tasks: dirty,
        });
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Compute one node's outputs, running only what is stale
    ///
    /// The node and its ancestors are validated first.
    pub async fn demand(&self, node_id: &str) -> Result<Evaluation> {
        let graph = self.get_graph_snapshot();
        if graph.find_node(node_id).is_none() {
            return Err(NodeEngineError::NodeNotFound(node_id.to_string()));
        }
        let scope = graph.upstream_closure(node_id);
        validate_nodes(&graph, Some(self.registry.as_ref()), &scope).into_result()?;

        let scope = EvaluationScope::new(graph, self.registry.clone(), self.context.clone());
        self.engine.demand(&scope, node_id).await
    }

    /// Run every node, level by level, under a fresh execution id
    pub async fn execute_all(&self) -> Result<ExecutionReport> {
        self.abort.reset();
        let ctx = self.run_context(Uuid::new_v4().to_string());
        self.scheduler().execute_full(&self.graph, &ctx).await
    }

    /// Re-run what an edit of `changed` made stale
    pub async fn execute_incremental(&self, changed: &[NodeId]) -> Result<ExecutionReport> {
        self.abort.reset();
        let ctx = self.run_context(Uuid::new_v4().to_string());
        self.scheduler().execute_incremental(&self.graph, changed, &ctx).await
    }

    /// Request cancellation of whatever is running
    pub fn abort(&self) {
        log::info!("Abort requested for session {}", self.execution_id);
        self.abort.abort();
    }

    /// Clear a previous abort so `demand` can run again
    pub fn reset_abort(&self) {
        self.abort.reset();
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.engine.clone(), self.registry.clone())
            .with_max_concurrent_nodes(self.config.max_concurrent_nodes)
    }

    fn run_context(&self, execution_id: String) -> ExecutionContext {
        ExecutionContext::new(execution_id, self.sink.clone())
            .with_extensions(self.extensions.clone())
            .with_abort_signal(self.abort.clone())
    }
}

/// Nodes of `new` that must be recomputed relative to `old`, and nodes
/// that disappeared
fn diff_graphs(old: &WorkflowGraph, new: &WorkflowGraph) -> Edit {
    let incoming = |graph: &WorkflowGraph, id: &str| {
        let mut edges: Vec<(String, String, String)> = graph
            .incoming_edges(id)
            .map(|e| (e.source.clone(), e.source_handle.clone(), e.target_handle.clone()))
            .collect();
        edges.sort();
        edges
    };

    let modified = new
        .nodes
        .iter()
        .filter(|node| match old.find_node(&node.id) {
            Some(before) => {
                before.node_type != node.node_type
                    || before.data != node.data
                    || incoming(old, &node.id) != incoming(new, &node.id)
            }
            None => true,
        })
        .map(|node| node.id.clone())
        .collect();

    let removed = old
        .nodes
        .iter()
        .filter(|node| new.find_node(&node.id).is_none())
        .map(|node| node.id.clone())
        .collect();

    Edit { modified, removed }
}

/// Everything downstream of `changed` (inclusive), in graph order
fn dirty_tasks(graph: &WorkflowGraph, changed: &[NodeId]) -> Vec<NodeId> {
    let mut dirty: HashSet<NodeId> = HashSet::new();
    for id in changed {
        if graph.find_node(id).is_some() {
            dirty.extend(graph.downstream_closure(id));
        }
    }
    graph
        .nodes
        .iter()
        .filter(|n| dirty.contains(&n.id))
        .map(|n| n.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::events::VecEventSink;
    use crate::scheduler::RunStatus;
    use serde_json::json;

    fn chain() -> WorkflowGraph {
        WorkflowBuilder::new("wf", "Chain")
            .add_node("a", "text-input", (0.0, 0.0))
            .with_data(json!({"text": "hello"}))
            .add_node("b", "text-output", (100.0, 0.0))
            .add_node("c", "text-input", (0.0, 100.0))
            .with_data(json!({"text": "other"}))
            .add_edge("a", "text", "b", "text")
            .build()
    }

    fn session(graph: WorkflowGraph) -> (WorkflowExecutor, Arc<VecEventSink>) {
        let sink = Arc::new(VecEventSink::new());
        let registry = Arc::new(NodeRegistry::with_builtins().unwrap());
        let executor = WorkflowExecutor::new("session", graph, registry, sink.clone()).unwrap();
        (executor, sink)
    }

    fn graph_modified(sink: &VecEventSink) -> Vec<Vec<String>> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::GraphModified { dirty_tasks, .. } => Some(dirty_tasks),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_demand_through_session() {
        let (executor, _) = session(chain());

        let evaluation = executor.demand("b").await.unwrap();
        assert_eq!(evaluation.outputs().unwrap()["text"], "hello");
        assert_eq!(executor.node_status("b"), NodeStatus::Success);
        assert!(executor.cached_outputs("a").is_some());
        assert!(executor.cached_outputs("c").is_none());

        assert!(matches!(
            executor.demand("missing").await,
            Err(NodeEngineError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_invalidates_downstream() {
        let (executor, sink) = session(chain());
        executor.demand("b").await.unwrap();

        executor.update_node_data("a", json!({"text": "changed"})).unwrap();
        assert_eq!(graph_modified(&sink), vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(executor.cached_outputs("b").is_none());

        let evaluation = executor.demand("b").await.unwrap();
        assert_eq!(evaluation.outputs().unwrap()["text"], "changed");
        assert_eq!(executor.engine().execution_count("b"), 2);
    }

    #[tokio::test]
    async fn test_position_change_keeps_cache() {
        let (executor, sink) = session(chain());
        executor.demand("b").await.unwrap();
        let version = executor.engine().version("a");

        executor.set_node_position("a", Position::new(50.0, 50.0)).unwrap();

        assert_eq!(executor.engine().version("a"), version);
        assert!(graph_modified(&sink).is_empty());
        assert!(executor.cached_outputs("b").is_some());
        assert!(executor.undo_redo_state().can_undo);
        assert_eq!(executor.get_graph_snapshot().find_node("a").unwrap().position.x, 50.0);
    }

    #[test]
    fn test_edge_edits() {
        let (executor, sink) = session(chain());

        executor.remove_edge("edge-1").unwrap();
        assert!(executor.get_graph_snapshot().edges.is_empty());

        executor
            .add_edge(GraphEdge::new("e2", "c", "text", "b", "text"))
            .unwrap();
        assert_eq!(
            graph_modified(&sink),
            vec![vec!["b".to_string()], vec!["b".to_string()]]
        );

        assert!(matches!(
            executor.add_edge(GraphEdge::new("e2", "a", "text", "b", "text")),
            Err(NodeEngineError::DuplicateEdge(_))
        ));
        assert!(matches!(
            executor.add_edge(GraphEdge::new("e3", "ghost", "text", "b", "text")),
            Err(NodeEngineError::NodeNotFound(_))
        ));
        assert!(matches!(
            executor.remove_edge("nope"),
            Err(NodeEngineError::EdgeNotFound(_))
        ));
    }

    #[test]
    fn test_add_and_remove_nodes() {
        let (executor, _) = session(chain());

        assert!(matches!(
            executor.add_node(GraphNode::new("x", "no-such-type")),
            Err(NodeEngineError::UnknownNodeType(_))
        ));
        assert!(executor
            .add_node(GraphNode::new("a", "text-input"))
            .unwrap_err()
            .is_validation());

        executor.add_node(GraphNode::new("d", "number-input")).unwrap();
        assert_eq!(executor.get_graph_snapshot().nodes.len(), 4);

        let before = executor.engine().version("b");
        executor.remove_node("a").unwrap();
        let graph = executor.get_graph_snapshot();
        assert!(graph.find_node("a").is_none());
        assert!(graph.edges.is_empty());
        assert!(executor.engine().version("b") > before);
    }

    #[tokio::test]
    async fn test_undo_redo_invalidates_changed_nodes() {
        let (executor, _) = session(chain());
        executor.demand("b").await.unwrap();
        executor.demand("c").await.unwrap();

        executor.update_node_data("a", json!({"text": "second"})).unwrap();
        executor.demand("b").await.unwrap();

        let restored = executor.undo().unwrap().unwrap();
        assert_eq!(restored.find_node("a").unwrap().data["text"], "hello");
        assert!(executor.cached_outputs("b").is_none());
        assert!(executor.cached_outputs("c").is_some());

        let evaluation = executor.demand("b").await.unwrap();
        assert_eq!(evaluation.outputs().unwrap()["text"], "hello");

        let redone = executor.redo().unwrap().unwrap();
        assert_eq!(redone.find_node("a").unwrap().data["text"], "second");
        assert!(executor.redo().unwrap().is_none());

        executor.undo().unwrap();
        assert!(executor.undo().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_human_input_resumes() {
        let graph = WorkflowBuilder::new("wf", "Ask")
            .add_node("ask", "human-input", (0.0, 0.0))
            .with_data(json!({"prompt": "Name?"}))
            .add_node("out", "text-output", (100.0, 0.0))
            .add_edge("ask", "value", "out", "text")
            .build();
        let (executor, _) = session(graph);

        match executor.demand("out").await.unwrap() {
            Evaluation::Waiting { node_id, prompt } => {
                assert_eq!(node_id, "ask");
                assert_eq!(prompt.as_deref(), Some("Name?"));
            }
            other => panic!("expected waiting, got {:?}", other),
        }
        assert_eq!(executor.node_status("ask"), NodeStatus::WaitingForInput);

        executor.provide_input("ask", "Ada").unwrap();
        let evaluation = executor.demand("out").await.unwrap();
        assert_eq!(evaluation.outputs().unwrap()["text"], "Ada");
    }

    #[tokio::test]
    async fn test_execute_all_and_abort() {
        let (executor, _) = session(chain());

        let report = executor.execute_all().await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.outputs.len(), 3);
        assert_ne!(report.execution_id, executor.execution_id());

        executor.abort();
        assert!(executor.demand("b").await.is_ok());
        executor.update_node_data("a", json!({"text": "again"})).unwrap();
        assert!(executor.demand("b").await.unwrap_err().is_cancelled());

        executor.reset_abort();
        assert!(executor.demand("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_graph_diffs() {
        let (executor, sink) = session(chain());
        executor.demand("b").await.unwrap();
        executor.demand("c").await.unwrap();

        let mut next = (*executor.get_graph_snapshot()).clone();
        next.find_node_mut("c").unwrap().data = json!({"text": "new"});
        executor.replace_graph(next).unwrap();

        assert_eq!(graph_modified(&sink), vec![vec!["c".to_string()]]);
        assert!(executor.cached_outputs("b").is_some());
        assert!(executor.cached_outputs("c").is_none());
    }
}

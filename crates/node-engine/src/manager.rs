//! Execution state manager for tracking workflow sessions
//!
//! Hosts usually keep one [`WorkflowExecutor`] per open workflow and look
//! it up by execution id on every command. This module owns that map,
//! tracks when each session was last used and drops idle ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::EventSink;
use crate::executor::WorkflowExecutor;
use crate::registry::NodeRegistry;
use crate::types::WorkflowGraph;
use crate::undo::UndoRedoState;

/// A tracked session
struct ExecutionEntry {
    executor: Arc<WorkflowExecutor>,
    created_at: Instant,
    last_accessed: Instant,
}

impl ExecutionEntry {
    fn new(executor: WorkflowExecutor) -> Self {
        let now = Instant::now();
        Self {
            executor: Arc::new(executor),
            created_at: now,
            last_accessed: now,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    fn is_stale(&self, timeout: Duration) -> bool {
        self.last_accessed.elapsed() > timeout
    }
}

/// Manager for all workflow sessions of a host
pub struct ExecutionManager {
    executions: RwLock<HashMap<String, ExecutionEntry>>,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    stale_timeout: Duration,
}

impl ExecutionManager {
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        let stale_timeout = config.session_timeout();
        Self {
            executions: RwLock::new(HashMap::new()),
            registry,
            config,
            stale_timeout,
        }
    }

    /// Override the idle timeout taken from the config
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    /// Open a session for `graph`, replacing any session with the same id
    pub async fn create_execution(
        &self,
        execution_id: impl Into<String>,
        graph: WorkflowGraph,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Arc<WorkflowExecutor>> {
        let execution_id = execution_id.into();
        let executor = WorkflowExecutor::with_config(
            execution_id.clone(),
            graph,
            self.registry.clone(),
            event_sink,
            self.config.clone(),
        )?;
        let entry = ExecutionEntry::new(executor);
        let executor = entry.executor.clone();

        let mut executions = self.executions.write().await;
        if executions.insert(execution_id.clone(), entry).is_some() {
            log::warn!("Replaced existing execution {}", execution_id);
        }
        Ok(executor)
    }

    /// Get a session by id, updating its last accessed time
    pub async fn get_execution(&self, execution_id: &str) -> Option<Arc<WorkflowExecutor>> {
        let mut executions = self.executions.write().await;
        executions.get_mut(execution_id).map(|entry| {
            entry.touch();
            entry.executor.clone()
        })
    }

    /// Run a synchronous function against a session
    ///
    /// For async work, take the handle from `get_execution` instead so the
    /// map is not locked across the await.
    pub async fn with_execution<F, R>(&self, execution_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&WorkflowExecutor) -> R,
    {
        let mut executions = self.executions.write().await;
        executions.get_mut(execution_id).map(|entry| {
            entry.touch();
            f(entry.executor.as_ref())
        })
    }

    /// Remove a session, aborting anything it still runs
    pub async fn remove_execution(&self, execution_id: &str) -> Option<Arc<WorkflowExecutor>> {
        let entry = self.executions.write().await.remove(execution_id)?;
        entry.executor.abort();
        log::debug!(
            "Removed execution {} after {:?}",
            execution_id,
            entry.created_at.elapsed()
        );
        Some(entry.executor)
    }

    /// Drop sessions idle for longer than the timeout
    pub async fn cleanup_stale(&self) -> usize {
        let mut executions = self.executions.write().await;
        let stale_ids: Vec<String> = executions
            .iter()
            .filter(|(_, entry)| entry.is_stale(self.stale_timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale_ids {
            if let Some(entry) = executions.remove(id) {
                entry.executor.abort();
            }
            log::debug!("Cleaned up stale execution: {}", id);
        }

        stale_ids.len()
    }

    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn has_execution(&self, execution_id: &str) -> bool {
        self.executions.read().await.contains_key(execution_id)
    }

    pub async fn get_undo_redo_state(&self, execution_id: &str) -> Option<UndoRedoState> {
        let executions = self.executions.read().await;
        executions
            .get(execution_id)
            .map(|entry| entry.executor.undo_redo_state())
    }
}

/// Shared execution manager type for host state
pub type SharedExecutionManager = Arc<ExecutionManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::types::GraphNode;

    fn manager() -> ExecutionManager {
        let registry = Arc::new(NodeRegistry::with_builtins().unwrap());
        ExecutionManager::new(registry, EngineConfig::default())
    }

    fn make_test_graph() -> WorkflowGraph {
        WorkflowGraph::new("test", "Test Workflow")
    }

    #[tokio::test]
    async fn test_create_and_get_execution() {
        let manager = manager();

        let executor = manager
            .create_execution("exec-1", make_test_graph(), Arc::new(NullEventSink))
            .await
            .unwrap();

        assert_eq!(executor.execution_id(), "exec-1");
        assert!(manager.has_execution("exec-1").await);
        assert!(!manager.has_execution("exec-2").await);
        assert!(manager.get_execution("exec-1").await.is_some());
    }

    #[tokio::test]
    async fn test_remove_execution_aborts() {
        let manager = manager();
        manager
            .create_execution("exec-1", make_test_graph(), Arc::new(NullEventSink))
            .await
            .unwrap();

        let removed = manager.remove_execution("exec-1").await.unwrap();

        assert!(removed.abort_signal().is_aborted());
        assert!(!manager.has_execution("exec-1").await);
        assert!(manager.remove_execution("exec-1").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_stale() {
        let manager = manager().with_timeout(Duration::from_millis(10));
        manager
            .create_execution("exec-1", make_test_graph(), Arc::new(NullEventSink))
            .await
            .unwrap();

        assert_eq!(manager.execution_count().await, 1);

        // Wait for execution to become stale
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cleaned = manager.cleanup_stale().await;
        assert_eq!(cleaned, 1);
        assert_eq!(manager.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_with_execution_and_undo_state() {
        let manager = manager();
        manager
            .create_execution("exec-1", make_test_graph(), Arc::new(NullEventSink))
            .await
            .unwrap();

        let result = manager
            .with_execution("exec-1", |executor| {
                executor.add_node(GraphNode::new("n1", "text-input"))
            })
            .await;
        assert!(matches!(result, Some(Ok(()))));

        let state = manager.get_undo_redo_state("exec-1").await.unwrap();
        assert!(state.can_undo);
        assert!(!state.can_redo);
        assert_eq!(state.undo_count, 1);

        assert!(manager.get_undo_redo_state("exec-2").await.is_none());
    }
}

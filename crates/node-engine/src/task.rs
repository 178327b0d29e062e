//! The contract every executable node type implements
//!
//! A node type is bound to exactly one [`Task`]: either a `Builtin` body
//! compiled into the engine, or a `HostBound` callback supplied by the
//! embedding application for work that needs resources only the host owns.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::types::NodeDefinition;

/// A value that flows through a port
pub type PortValue = serde_json::Value;

/// Resolved inputs for node execution, keyed by input port id
pub type NodeInputs = HashMap<String, PortValue>;

/// Outputs produced by node execution, keyed by output port id
pub type NodeOutputs = HashMap<String, PortValue>;

/// How a task run ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The node produced its outputs
    Completed(NodeOutputs),
    /// The node is suspended until the user supplies input. Not an error,
    /// and nothing is cached.
    WaitingForInput { prompt: Option<String> },
}

impl From<NodeOutputs> for TaskOutcome {
    fn from(outputs: NodeOutputs) -> Self {
        Self::Completed(outputs)
    }
}

/// Trait for node types that describe their own metadata
pub trait TaskDescriptor {
    /// Get the static definition for this node type
    fn descriptor() -> NodeDefinition
    where
        Self: Sized;
}

/// Executable body of a built-in node type
///
/// Long-running bodies should poll `ctx.is_aborted()` between steps and
/// return `NodeEngineError::Cancelled` promptly once it is set.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome>;
}

/// Everything a host callback receives for one node execution
pub struct HostCall {
    pub node_id: String,
    pub node_type: String,
    pub inputs: NodeInputs,
    pub context: ExecutionContext,
}

type HostFuture = Pin<Box<dyn Future<Output = Result<TaskOutcome>> + Send>>;

/// Handle onto a host-supplied async callback
///
/// A callback resolves to anything convertible into a [`TaskOutcome`]:
/// plain [`NodeOutputs`] for a completed run, or a `TaskOutcome` itself
/// when the host needs to suspend the node for user input.
pub struct HostHandle {
    callback: Box<dyn Fn(HostCall) -> HostFuture + Send + Sync>,
}

impl HostHandle {
    pub fn new<F, Fut, O>(callback: F) -> Self
    where
        F: Fn(HostCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<TaskOutcome> + 'static,
    {
        Self {
            callback: Box::new(move |call| {
                let pending = callback(call);
                Box::pin(async move { pending.await.map(Into::into) })
            }),
        }
    }

    async fn call(&self, call: HostCall) -> Result<TaskOutcome> {
        (self.callback)(call).await
    }
}

/// The behavior bound to a node type
#[derive(Clone)]
pub enum Task {
    /// Logic compiled into the engine
    Builtin(Arc<dyn NodeExecutor>),
    /// Logic supplied by the embedding host
    HostBound(Arc<HostHandle>),
}

impl Task {
    pub fn builtin(executor: impl NodeExecutor + 'static) -> Self {
        Self::Builtin(Arc::new(executor))
    }

    /// Bind an async host callback
    pub fn host<F, Fut, O>(callback: F) -> Self
    where
        F: Fn(HostCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<TaskOutcome> + 'static,
    {
        Self::HostBound(Arc::new(HostHandle::new(callback)))
    }

    /// A built-in body from a synchronous closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, NodeInputs) -> Result<NodeOutputs> + Send + Sync + 'static,
    {
        Self::builtin(FnExecutor(f))
    }

    /// Placeholder body for node types whose effect only the host can provide
    pub fn unbound(node_type: impl Into<String>) -> Self {
        Self::builtin(UnboundExecutor {
            node_type: node_type.into(),
        })
    }

    pub fn is_host_bound(&self) -> bool {
        matches!(self, Self::HostBound(_))
    }

    /// Run the bound behavior for one node
    pub async fn run(
        &self,
        node_id: &str,
        node_type: &str,
        inputs: NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        match self {
            Self::Builtin(executor) => executor.execute(node_id, inputs, ctx).await,
            Self::HostBound(handle) => {
                let call = HostCall {
                    node_id: node_id.to_string(),
                    node_type: node_type.to_string(),
                    inputs,
                    context: ctx.clone(),
                };
                handle.call(call).await
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin(_) => f.write_str("Task::Builtin"),
            Self::HostBound(_) => f.write_str("Task::HostBound"),
        }
    }
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F> NodeExecutor for FnExecutor<F>
where
    F: Fn(&str, NodeInputs) -> Result<NodeOutputs> + Send + Sync,
{
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        (self.0)(node_id, inputs).map(TaskOutcome::Completed)
    }
}

struct UnboundExecutor {
    node_type: String,
}

#[async_trait]
impl NodeExecutor for UnboundExecutor {
    async fn execute(
        &self,
        node_id: &str,
        _inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        Err(NodeEngineError::failed(format!(
            "Node type '{}' requires host-specific executor (node '{}')",
            self.node_type, node_id
        )))
    }
}

/// Helper trait for extracting typed values from NodeInputs
pub trait InputsExt {
    /// Get a required string input
    fn get_string(&self, key: &str) -> Result<&str>;

    /// Get an optional string input
    fn get_string_opt(&self, key: &str) -> Option<&str>;

    /// Get a required number input
    fn get_number(&self, key: &str) -> Result<f64>;

    /// Get an optional number input with default
    fn get_number_or(&self, key: &str, default: f64) -> f64;

    /// Get a required boolean input
    fn get_bool(&self, key: &str) -> Result<bool>;

    /// Get an optional boolean input with default
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
}

impl InputsExt for NodeInputs {
    fn get_string(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Err(NodeEngineError::MissingInput(key.to_string())),
            Some(value) => value.as_str().ok_or_else(|| NodeEngineError::InvalidInputType {
                port: key.to_string(),
                expected: "string".to_string(),
            }),
        }
    }

    fn get_string_opt(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_number(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Err(NodeEngineError::MissingInput(key.to_string())),
            Some(value) => value.as_f64().ok_or_else(|| NodeEngineError::InvalidInputType {
                port: key.to_string(),
                expected: "number".to_string(),
            }),
        }
    }

    fn get_number_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Err(NodeEngineError::MissingInput(key.to_string())),
            Some(value) => value.as_bool().ok_or_else(|| NodeEngineError::InvalidInputType {
                port: key.to_string(),
                expected: "boolean".to_string(),
            }),
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_from_fn() {
        let task = Task::from_fn(|node_id, _inputs| {
            let mut outputs = NodeOutputs::new();
            outputs.insert("result".to_string(), json!(node_id));
            Ok(outputs)
        });

        let ctx = ExecutionContext::detached("exec");
        let outcome = task.run("n-1", "echo", NodeInputs::new(), &ctx).await.unwrap();
        assert!(!task.is_host_bound());
        match outcome {
            TaskOutcome::Completed(outputs) => assert_eq!(outputs["result"], "n-1"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_host_bound_receives_call() {
        let task = Task::host(|call: HostCall| async move {
            let mut outputs = call.inputs;
            outputs.insert("type".to_string(), json!(call.node_type));
            outputs.insert("exec".to_string(), json!(call.context.execution_id()));
            Ok(outputs)
        });

        let ctx = ExecutionContext::detached("exec-7");
        let mut inputs = NodeInputs::new();
        inputs.insert("prompt".to_string(), json!("hi"));

        let outcome = task.run("llm-1", "llm-inference", inputs, &ctx).await.unwrap();
        assert!(task.is_host_bound());
        let TaskOutcome::Completed(outputs) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outputs["prompt"], "hi");
        assert_eq!(outputs["type"], "llm-inference");
        assert_eq!(outputs["exec"], "exec-7");
    }

    #[tokio::test]
    async fn test_host_bound_can_wait_for_input() {
        let task = Task::host(|call: HostCall| async move {
            if call.inputs.get_string_opt("answer").is_some() {
                return Ok(TaskOutcome::from(call.inputs));
            }
            Ok(TaskOutcome::WaitingForInput {
                prompt: Some("Approve the draft?".to_string()),
            })
        });
        let ctx = ExecutionContext::detached("exec");

        let outcome = task
            .run("review", "review-gate", NodeInputs::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::WaitingForInput {
                prompt: Some("Approve the draft?".to_string())
            }
        );

        let mut inputs = NodeInputs::new();
        inputs.insert("answer".to_string(), json!("yes"));
        let outcome = task.run("review", "review-gate", inputs, &ctx).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Completed(outputs) if outputs["answer"] == "yes"));
    }

    #[tokio::test]
    async fn test_unbound_stub_fails() {
        let task = Task::unbound("llm-inference");
        let ctx = ExecutionContext::detached("exec");
        let err = task
            .run("llm-1", "llm-inference", NodeInputs::new(), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires host-specific executor"));
    }

    #[test]
    fn test_inputs_ext() {
        let mut inputs = NodeInputs::new();
        inputs.insert("text".into(), json!("hello"));
        inputs.insert("count".into(), json!(42.0));
        inputs.insert("flag".into(), json!(true));

        assert_eq!(inputs.get_string("text").unwrap(), "hello");
        assert!(matches!(inputs.get_string("missing"), Err(NodeEngineError::MissingInput(_))));
        assert!(matches!(
            inputs.get_string("count"),
            Err(NodeEngineError::InvalidInputType { .. })
        ));
        assert_eq!(inputs.get_number("count").unwrap(), 42.0);
        assert_eq!(inputs.get_number_or("missing", 10.0), 10.0);
        assert!(inputs.get_bool("flag").unwrap());
        assert!(!inputs.get_bool_or("missing", false));
    }
}

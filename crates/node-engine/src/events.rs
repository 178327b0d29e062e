//! Event types for streaming workflow progress
//!
//! Events are sent from the engine to the frontend (or any consumer)
//! to report progress, streaming output, errors, and state changes.
//! A failing sink never aborts a run: the engine logs and moves on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::task::NodeOutputs;

/// Trait for sending workflow events
///
/// This abstracts over the transport mechanism (UI channel, mpsc, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The receiving side is gone
    ChannelClosed,
    /// Any other transport failure
    Transport(String),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "Event error: channel closed"),
            Self::Transport(message) => write!(f, "Event error: {}", message),
        }
    }
}

impl std::error::Error for EventError {}

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Workflow execution started
    #[serde(rename_all = "camelCase")]
    Started {
        workflow_id: String,
        execution_id: String,
        node_count: usize,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        node_type: String,
        execution_id: String,
    },

    /// Progress update for a node
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        node_id: String,
        execution_id: String,
        progress: f32,
        message: Option<String>,
    },

    /// Partial output from a streaming node
    #[serde(rename_all = "camelCase")]
    NodeStream {
        node_id: String,
        execution_id: String,
        port: String,
        chunk: serde_json::Value,
    },

    /// A node completed successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
        outputs: NodeOutputs,
    },

    /// A node failed
    #[serde(rename_all = "camelCase")]
    NodeError {
        node_id: String,
        execution_id: String,
        message: String,
    },

    /// A node suspended until the user provides input
    #[serde(rename_all = "camelCase")]
    WaitingForInput {
        node_id: String,
        execution_id: String,
        prompt: Option<String>,
    },

    /// Workflow execution completed
    #[serde(rename_all = "camelCase")]
    Completed {
        workflow_id: String,
        execution_id: String,
        outputs: HashMap<String, NodeOutputs>,
    },

    /// Workflow execution failed or was cancelled
    #[serde(rename_all = "camelCase")]
    Failed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// Graph was modified by an edit
    #[serde(rename_all = "camelCase")]
    GraphModified {
        workflow_id: String,
        dirty_tasks: Vec<String>,
    },

    /// Incremental re-execution started
    #[serde(rename_all = "camelCase")]
    IncrementalExecutionStarted {
        workflow_id: String,
        execution_id: String,
        tasks: Vec<String>,
    },
}

impl WorkflowEvent {
    /// The node this event concerns, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeProgress { node_id, .. }
            | Self::NodeStream { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeError { node_id, .. }
            | Self::WaitingForInput { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Whether this is a run-terminating event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Engine-side handle to a sink
///
/// Stamps the execution id onto node events and swallows sink failures
/// after logging them.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    execution_id: String,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>, execution_id: impl Into<String>) -> Self {
        Self {
            sink,
            execution_id: execution_id.into(),
        }
    }

    /// The execution id stamped on emitted events
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Send an event, logging and discarding any sink error
    pub fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.sink.send(event) {
            log::warn!("Dropping workflow event for execution {}: {}", self.execution_id, e);
        }
    }

    pub fn node_started(&self, node_id: &str, node_type: &str) {
        self.emit(WorkflowEvent::NodeStarted {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            execution_id: self.execution_id.clone(),
        });
    }

    pub fn node_progress(&self, node_id: &str, progress: f32, message: Option<String>) {
        self.emit(WorkflowEvent::NodeProgress {
            node_id: node_id.to_string(),
            execution_id: self.execution_id.clone(),
            progress,
            message,
        });
    }

    pub fn node_stream(&self, node_id: &str, port: &str, chunk: serde_json::Value) {
        self.emit(WorkflowEvent::NodeStream {
            node_id: node_id.to_string(),
            execution_id: self.execution_id.clone(),
            port: port.to_string(),
            chunk,
        });
    }

    pub fn node_completed(&self, node_id: &str, outputs: NodeOutputs) {
        self.emit(WorkflowEvent::NodeCompleted {
            node_id: node_id.to_string(),
            execution_id: self.execution_id.clone(),
            outputs,
        });
    }

    pub fn node_error(&self, node_id: &str, message: impl Into<String>) {
        self.emit(WorkflowEvent::NodeError {
            node_id: node_id.to_string(),
            execution_id: self.execution_id.clone(),
            message: message.into(),
        });
    }

    pub fn waiting_for_input(&self, node_id: &str, prompt: Option<String>) {
        self.emit(WorkflowEvent::WaitingForInput {
            node_id: node_id.to_string(),
            execution_id: self.execution_id.clone(),
            prompt,
        });
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Ids of nodes that emitted `NodeStarted`, in order
    pub fn started_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::NodeStarted { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into a tokio channel, e.g. towards a UI transport task
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::ChannelClosed)
    }
}

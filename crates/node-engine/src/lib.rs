//! Node Engine - Graph-based workflow execution
//!
//! This crate provides a demand-driven, lazy evaluation workflow engine
//! for visual node editors. It supports:
//!
//! - Typed ports and whole-graph validation before anything runs
//! - Demand-driven lazy evaluation (only compute what's needed)
//! - Level-by-level parallel execution, full or incremental
//! - Human-in-the-loop with WaitForInput
//! - Compressed snapshot-based undo/redo
//! - Cooperative cancellation
//!
//! # Architecture
//!
//! - `NodeRegistry`: node type metadata plus the task bound to each type
//! - `DemandEngine`: pull-based evaluation with fingerprint-checked caching
//! - `Scheduler`: Kahn leveling, full and incremental runs
//! - `WorkflowExecutor`: one editable session owning graph, cache and history
//! - `UndoStack`: compressed immutable snapshots for undo/redo
//! - `EventSink`: generic event streaming, independent of any UI transport
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use node_engine::{NodeRegistry, NullEventSink, WorkflowBuilder, WorkflowExecutor};
//!
//! # tokio_test::block_on(async {
//! let graph = WorkflowBuilder::new("greeting", "Greeting")
//!     .add_node("name", "text-input", (0.0, 0.0))
//!     .with_data(serde_json::json!({"text": "world"}))
//!     .add_node("show", "text-output", (200.0, 0.0))
//!     .add_edge("name", "text", "show", "text")
//!     .build();
//!
//! let registry = Arc::new(NodeRegistry::with_builtins().unwrap());
//! let session = WorkflowExecutor::new("s1", graph, registry, Arc::new(NullEventSink)).unwrap();
//!
//! let result = session.demand("show").await.unwrap();
//! assert_eq!(result.outputs().unwrap()["text"], "world");
//! # });
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod extensions;
pub mod manager;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod tasks;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::EngineConfig;
pub use context::{AbortSignal, ExecutionContext};
pub use engine::{CacheStats, DemandEngine, Evaluation, EvaluationScope, Fingerprint, NodeStatus};
pub use error::{NodeEngineError, Result};
pub use events::{
    ChannelEventSink, EventEmitter, EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent,
};
pub use executor::WorkflowExecutor;
pub use extensions::{extension_keys, ExecutorExtensions};
pub use manager::{ExecutionManager, SharedExecutionManager};
pub use persistence::{Viewport, WorkflowFile, WorkflowMetadata, WORKFLOW_FILE_VERSION};
pub use registry::NodeRegistry;
pub use scheduler::{
    compute_levels, dirty_set, ExecutionReport, GraphSnapshot, NodeFailure, RunStatus, Scheduler,
};
pub use task::{
    HostCall, HostHandle, InputsExt, NodeExecutor, NodeInputs, NodeOutputs, PortValue, Task,
    TaskDescriptor, TaskOutcome,
};
pub use types::*;
pub use undo::{UndoRedoState, UndoStack};
pub use validation::{validate_nodes, validate_workflow, ValidationError, ValidationErrors};

// The run-scoped key/value store handed to tasks
pub use graph_flow::Context;

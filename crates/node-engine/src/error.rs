//! Error types for the node engine

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
///
/// The type is `Clone` because a single in-flight node execution hands
/// its result to every caller that was coalesced onto it.
#[derive(Debug, Clone, Error)]
pub enum NodeEngineError {
    /// The graph was rejected before any node ran
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Missing required input at execution time
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Invalid input type
    #[error("Invalid input type for '{port}': expected {expected}")]
    InvalidInputType { port: String, expected: String },

    /// Task execution failed
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Context value or host resource not found
    #[error("Context value not found: {0}")]
    ContextNotFound(String),

    /// A node type was registered twice
    #[error("Node type '{0}' is already registered")]
    DuplicateNodeType(String),

    /// A node references a type the registry does not know
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A node id was not found in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An edge id was not found in the graph
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// An edge id is already used in the graph
    #[error("Edge already exists: {0}")]
    DuplicateEdge(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Workflow file has a version this build cannot read
    #[error("Unsupported workflow file version: {0}")]
    UnsupportedFileVersion(String),

    /// Workflow was cancelled
    #[error("Workflow cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl NodeEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether this error represents cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the graph was rejected before execution
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ValidationErrors> for NodeEngineError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<serde_json::Error> for NodeEngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for NodeEngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_validation_error_display() {
        let err: NodeEngineError = ValidationErrors(vec![ValidationError::CycleDetected {
            node_ids: vec!["a".to_string(), "b".to_string()],
        }])
        .into();

        assert!(err.is_validation());
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = NodeEngineError::failed("boom");
        let copy = err.clone();
        assert_eq!(copy.to_string(), "Task execution failed: boom");
        assert!(!copy.is_cancelled());
        assert!(NodeEngineError::Cancelled.is_cancelled());
    }
}

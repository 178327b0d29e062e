//! Execution context handed to every task
//!
//! Bundles what a running node may touch: the shared abort signal, the
//! host's resources, a run-scoped key/value store and the event emitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use graph_flow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{NodeEngineError, Result};
use crate::events::{EventEmitter, EventSink, NullEventSink};
use crate::extensions::ExecutorExtensions;

/// Shared cooperative cancellation flag
///
/// Cloning yields a handle onto the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous request so the signal can be reused for the next run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(NodeEngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Context available to all nodes during execution
#[derive(Clone)]
pub struct ExecutionContext {
    execution_id: String,
    abort: AbortSignal,
    extensions: Arc<ExecutorExtensions>,
    values: Context,
    events: EventEmitter,
}

impl ExecutionContext {
    /// Create a context with no host resources
    pub fn new(execution_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        let execution_id = execution_id.into();
        Self {
            events: EventEmitter::new(sink, execution_id.clone()),
            execution_id,
            abort: AbortSignal::new(),
            extensions: Arc::new(ExecutorExtensions::new()),
            values: Context::new(),
        }
    }

    /// A context that drops every event, for tests and headless use
    pub fn detached(execution_id: impl Into<String>) -> Self {
        Self::new(execution_id, Arc::new(NullEventSink))
    }

    pub fn with_extensions(mut self, extensions: Arc<ExecutorExtensions>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn extensions(&self) -> &ExecutorExtensions {
        &self.extensions
    }

    /// Host resource by key, `None` if absent or of another type
    pub fn extension<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.extensions.get(key)
    }

    /// Host resource by key, or a context error
    pub fn require_extension<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T> {
        self.extensions.require(key)
    }

    /// The run-scoped key/value store shared by all nodes of this execution
    pub fn context(&self) -> &Context {
        &self.values
    }

    pub async fn set_value<T: Serialize + Send + Sync>(&self, key: &str, value: T) {
        self.values.set(key, value).await;
    }

    pub async fn get_value<T: DeserializeOwned + Send + Sync>(&self, key: &str) -> Option<T> {
        self.values.get(key).await
    }

    /// Typed run-scoped value; missing or malformed entries are a context error
    pub async fn require_value<T: DeserializeOwned + Send + Sync>(&self, key: &str) -> Result<T> {
        self.values
            .get(key)
            .await
            .ok_or_else(|| NodeEngineError::ContextNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::extension_keys;

    #[test]
    fn test_abort_signal_is_shared() {
        let signal = AbortSignal::new();
        let ctx = ExecutionContext::detached("exec").with_abort_signal(signal.clone());

        assert!(!ctx.is_aborted());
        assert!(ctx.abort_signal().check().is_ok());

        signal.abort();
        assert!(ctx.is_aborted());
        assert!(matches!(ctx.abort_signal().check(), Err(NodeEngineError::Cancelled)));

        signal.reset();
        assert!(!ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_run_scoped_values() {
        let ctx = ExecutionContext::detached("exec");
        ctx.set_value("temperature", 0.7f64).await;

        assert_eq!(ctx.get_value::<f64>("temperature").await, Some(0.7));
        assert_eq!(ctx.require_value::<f64>("temperature").await.unwrap(), 0.7);
        assert!(matches!(
            ctx.require_value::<f64>("missing").await,
            Err(NodeEngineError::ContextNotFound(_))
        ));
    }

    #[test]
    fn test_host_resources() {
        let mut extensions = ExecutorExtensions::new();
        extensions.set(extension_keys::INFERENCE_ENDPOINT, "http://127.0.0.1:11434".to_string());
        let ctx = ExecutionContext::detached("exec").with_extensions(Arc::new(extensions));

        assert!(ctx.extension::<String>(extension_keys::INFERENCE_ENDPOINT).is_some());
        assert!(ctx.require_extension::<String>(extension_keys::PROJECT_ROOT).is_err());
    }
}

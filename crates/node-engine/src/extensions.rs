//! Typed resource map for host-supplied dependencies.
//!
//! Hosts put runtime objects the engine cannot serialize (service clients,
//! endpoints, handles) in here before a run; tasks read them back through
//! [`ExecutionContext::extension`](crate::ExecutionContext::extension).

use std::any::Any;
use std::collections::HashMap;

use crate::error::{NodeEngineError, Result};

/// Typed map of host resources, keyed by name
#[derive(Default)]
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under `key`, replacing any previous value.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// `None` if the key is absent or holds a different type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    /// Like [`get`](Self::get) but reports a context error for absent or mistyped keys.
    pub fn require<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T> {
        match self.inner.get(key) {
            None => Err(NodeEngineError::ContextNotFound(key.to_string())),
            Some(value) => value.downcast_ref().ok_or_else(|| {
                NodeEngineError::ContextNotFound(format!(
                    "{} (expected {})",
                    key,
                    std::any::type_name::<T>()
                ))
            }),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Well-known extension keys.
pub mod extension_keys {
    /// `String` base URL of a locally running inference service.
    pub const INFERENCE_ENDPOINT: &str = "inference_endpoint";
    /// `std::path::PathBuf` root directory of the current project.
    pub const PROJECT_ROOT: &str = "project_root";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_get() {
        let mut ext = ExecutorExtensions::new();
        ext.set(extension_keys::INFERENCE_ENDPOINT, "http://localhost:8080".to_string());

        assert_eq!(
            ext.get::<String>(extension_keys::INFERENCE_ENDPOINT).map(String::as_str),
            Some("http://localhost:8080")
        );
        assert!(ext.has(extension_keys::INFERENCE_ENDPOINT));
        assert!(!ext.has("missing"));
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_require_reports_missing_and_mistyped() {
        let mut ext = ExecutorExtensions::new();
        ext.set("count", 42u32);

        assert_eq!(*ext.require::<u32>("count").unwrap(), 42);
        assert!(matches!(
            ext.require::<String>("count"),
            Err(NodeEngineError::ContextNotFound(_))
        ));
        assert!(matches!(
            ext.require::<u32>("absent"),
            Err(NodeEngineError::ContextNotFound(key)) if key == "absent"
        ));
    }

    #[test]
    fn test_shared_values() {
        let mut ext = ExecutorExtensions::new();
        ext.set("data", Arc::new(vec![1, 2, 3]));
        ext.set("data", Arc::new(vec![4]));

        let retrieved = ext.get::<Arc<Vec<i32>>>("data").unwrap();
        assert_eq!(retrieved.as_ref(), &vec![4]);
    }
}

//! Workflow file format
//!
//! A saved workflow is a versioned JSON document:
//! `{ version, metadata: {name, description?, created, modified}, graph, viewport? }`.
//! Readers accept any file with the same major version.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::types::WorkflowGraph;

/// Version written by this build
pub const WORKFLOW_FILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RFC 3339 timestamp
    pub created: String,
    /// RFC 3339 timestamp
    pub modified: String,
}

/// Canvas viewport, stored for the editor and never read by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFile {
    pub version: String,
    pub metadata: WorkflowMetadata,
    pub graph: WorkflowGraph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl WorkflowFile {
    /// Wrap a graph in a new file, stamped now
    pub fn new(name: impl Into<String>, graph: WorkflowGraph) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            version: WORKFLOW_FILE_VERSION.to_string(),
            metadata: WorkflowMetadata {
                name: name.into(),
                description: None,
                created: now.clone(),
                modified: now,
            },
            graph,
            viewport: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.metadata.modified = Utc::now().to_rfc3339();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a file, rejecting unknown major versions
    pub fn from_json(json: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(json)?;
        if major_version(&file.version) != major_version(WORKFLOW_FILE_VERSION) {
            return Err(NodeEngineError::UnsupportedFileVersion(file.version));
        }
        Ok(file)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        tokio::fs::write(path.as_ref(), json).await?;
        log::debug!("Saved workflow '{}' to {}", self.metadata.name, path.as_ref().display());
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&json)
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;

    fn sample() -> WorkflowFile {
        let graph = WorkflowBuilder::new("wf-1", "Sample")
            .add_node("in", "text-input", (0.0, 0.0))
            .with_data(serde_json::json!({"text": "hi"}))
            .add_node("out", "text-output", (200.0, 0.0))
            .add_edge("in", "text", "out", "text")
            .build();
        WorkflowFile::new("Sample", graph)
    }

    #[test]
    fn test_json_shape() {
        let file = sample().with_viewport(Viewport::default());
        let json: serde_json::Value = serde_json::from_str(&file.to_json().unwrap()).unwrap();

        assert_eq!(json["version"], "1.0");
        assert_eq!(json["metadata"]["name"], "Sample");
        assert!(json["metadata"].get("description").is_none());
        assert_eq!(json["graph"]["edges"][0]["sourceHandle"], "text");
        assert_eq!(json["viewport"]["zoom"], 1.0);
    }

    #[test]
    fn test_rejects_future_major_version() {
        let mut file = sample();
        file.version = "2.0".to_string();
        let json = serde_json::to_string(&file).unwrap();

        assert!(matches!(
            WorkflowFile::from_json(&json),
            Err(NodeEngineError::UnsupportedFileVersion(v)) if v == "2.0"
        ));

        file.version = "1.3".to_string();
        assert!(WorkflowFile::from_json(&serde_json::to_string(&file).unwrap()).is_ok());
    }

    #[test]
    fn test_touch_keeps_created() {
        let mut file = sample();
        let created = file.metadata.created.clone();
        file.touch();
        assert_eq!(file.metadata.created, created);
        assert!(chrono::DateTime::parse_from_rfc3339(&file.metadata.modified).is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        let file = sample().with_description("two nodes");

        file.save(&path).await.unwrap();
        let loaded = WorkflowFile::load(&path).await.unwrap();
        assert_eq!(loaded, file);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorkflowFile::load(dir.path().join("missing.json")).await;
        assert!(matches!(result, Err(NodeEngineError::Io(_))));
    }
}

//! Merge Task
//!
//! Combines multiple string inputs into a single output.
//! This task is useful for aggregating results from parallel branches
//! or combining context from multiple sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::task::{NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Configuration for the merge task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Separator to use when joining inputs
    pub separator: String,
    /// Whether to filter out empty inputs
    pub filter_empty: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
            filter_empty: true,
        }
    }
}

/// Merge Task
///
/// Joins every value connected to `inputs` using the configured separator.
/// A node may override the separator through its `separator` data key.
///
/// # Inputs
/// - `inputs` (multiple) - Values to merge, in edge order
///
/// # Outputs
/// - `merged` - Combined string output
/// - `count` - Number of inputs merged
#[derive(Default)]
pub struct MergeTask {
    config: MergeConfig,
}

impl MergeTask {
    /// Port ID for inputs (accepts multiple connections)
    pub const PORT_INPUTS: &'static str = "inputs";
    /// Port ID for merged output
    pub const PORT_MERGED: &'static str = "merged";
    /// Port ID for count output
    pub const PORT_COUNT: &'static str = "count";

    pub fn with_config(config: MergeConfig) -> Self {
        Self { config }
    }
}

impl TaskDescriptor for MergeTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "merge".to_string(),
            category: NodeCategory::Control,
            label: "Merge".to_string(),
            description: "Combines multiple string inputs into one".to_string(),
            inputs: vec![
                PortDefinition::optional(Self::PORT_INPUTS, "Inputs", PortDataType::String).multiple(),
            ],
            outputs: vec![
                PortDefinition::optional(Self::PORT_MERGED, "Merged", PortDataType::String),
                PortDefinition::optional(Self::PORT_COUNT, "Count", PortDataType::Number),
            ],
            execution_mode: ExecutionMode::Reactive,
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl NodeExecutor for MergeTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let values: Vec<String> = match inputs.get(Self::PORT_INPUTS) {
            Some(Value::Array(items)) => items.iter().map(render).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![render(single)],
        };

        let separator = inputs
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.separator);

        let filtered: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|s| !self.config.filter_empty || !s.trim().is_empty())
            .collect();

        let merged = filtered.join(separator);
        log::debug!(
            "MergeTask {}: merged {} inputs into {} chars",
            node_id,
            filtered.len(),
            merged.len()
        );

        let mut outputs = NodeOutputs::new();
        outputs.insert(Self::PORT_MERGED.to_string(), json!(merged));
        outputs.insert(Self::PORT_COUNT.to_string(), json!(filtered.len() as f64));
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(task: &MergeTask, inputs: NodeInputs) -> NodeOutputs {
        let ctx = ExecutionContext::detached("exec");
        match task.execute("merge", inputs, &ctx).await.unwrap() {
            TaskOutcome::Completed(outputs) => outputs,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_descriptor() {
        let meta = MergeTask::descriptor();
        assert_eq!(meta.node_type, "merge");
        assert_eq!(meta.category, NodeCategory::Control);
        assert!(meta.inputs[0].multiple);
        assert_eq!(meta.outputs.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_multiple_inputs() {
        let mut inputs = NodeInputs::new();
        inputs.insert("inputs".to_string(), json!(["First", "", "Third"]));

        let outputs = run(&MergeTask::default(), inputs).await;
        assert_eq!(outputs["merged"], "First\nThird");
        assert_eq!(outputs["count"], 2.0);
    }

    #[tokio::test]
    async fn test_merge_single_and_none() {
        let mut inputs = NodeInputs::new();
        inputs.insert("inputs".to_string(), json!("Only one"));
        assert_eq!(run(&MergeTask::default(), inputs).await["merged"], "Only one");

        assert_eq!(run(&MergeTask::default(), NodeInputs::new()).await["merged"], "");
    }

    #[tokio::test]
    async fn test_merge_with_custom_separator() {
        let task = MergeTask::with_config(MergeConfig {
            separator: " | ".to_string(),
            filter_empty: false,
        });
        let mut inputs = NodeInputs::new();
        inputs.insert("inputs".to_string(), json!(["A", "", 3]));

        assert_eq!(run(&task, inputs.clone()).await["merged"], "A |  | 3");

        inputs.insert("separator".to_string(), json!(","));
        assert_eq!(run(&task, inputs).await["merged"], "A,,3");
    }
}

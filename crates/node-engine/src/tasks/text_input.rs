//! Text Input Task
//!
//! Provides user-entered text as the starting point of a workflow.

use async_trait::async_trait;
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::task::{InputsExt, NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Text Input Task
///
/// The text is normally configured in the node's data under `text`, but
/// may also be fed from an upstream connection.
///
/// # Outputs
/// - `text` - The text value, empty when nothing was configured
pub struct TextInputTask;

impl TextInputTask {
    /// Port ID for text input
    pub const PORT_TEXT: &'static str = "text";
}

impl TaskDescriptor for TextInputTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "text-input".to_string(),
            category: NodeCategory::Input,
            label: "Text Input".to_string(),
            description: "Provides user-entered text as input to the workflow".to_string(),
            inputs: vec![PortDefinition::optional(
                Self::PORT_TEXT,
                "Text",
                PortDataType::String,
            )],
            outputs: vec![PortDefinition::optional(
                Self::PORT_TEXT,
                "Text",
                PortDataType::String,
            )],
            execution_mode: ExecutionMode::Reactive,
        }
    }
}

#[async_trait]
impl NodeExecutor for TextInputTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let text = inputs.get_string_opt(Self::PORT_TEXT).unwrap_or_default();
        log::debug!("TextInputTask {}: {} chars", node_id, text.len());

        let mut outputs = NodeOutputs::new();
        outputs.insert(Self::PORT_TEXT.to_string(), json!(text));
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let meta = TextInputTask::descriptor();
        assert_eq!(meta.node_type, "text-input");
        assert_eq!(meta.category, NodeCategory::Input);
        assert_eq!(meta.outputs[0].id, "text");
    }

    #[tokio::test]
    async fn test_passes_text_through() {
        let mut inputs = NodeInputs::new();
        inputs.insert("text".to_string(), json!("Hello"));

        let ctx = ExecutionContext::detached("exec");
        let outcome = TextInputTask.execute("in", inputs, &ctx).await.unwrap();
        let TaskOutcome::Completed(outputs) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outputs["text"], "Hello");
    }

    #[tokio::test]
    async fn test_empty_without_text() {
        let ctx = ExecutionContext::detached("exec");
        let outcome = TextInputTask.execute("in", NodeInputs::new(), &ctx).await.unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Completed(NodeOutputs::from([("text".to_string(), json!(""))]))
        );
    }
}

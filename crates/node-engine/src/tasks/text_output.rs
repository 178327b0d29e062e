//! Text Output Task
//!
//! Terminal display node. Non-string values are rendered to text so any
//! compatible upstream port can be shown.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::task::{NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Text Output Task
///
/// # Inputs
/// - `text` (required) - Text to display
///
/// # Outputs
/// - `text` - The rendered text
pub struct TextOutputTask;

impl TextOutputTask {
    /// Port ID for text input and output
    pub const PORT_TEXT: &'static str = "text";
}

impl TaskDescriptor for TextOutputTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "text-output".to_string(),
            category: NodeCategory::Output,
            label: "Text Output".to_string(),
            description: "Displays text output".to_string(),
            inputs: vec![PortDefinition::required(
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
impl NodeExecutor for TextOutputTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let text = match inputs.get(Self::PORT_TEXT) {
            None | Some(Value::Null) => {
                return Err(NodeEngineError::MissingInput(Self::PORT_TEXT.to_string()))
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        log::debug!("TextOutputTask {}: displaying {} chars", node_id, text.len());

        let mut outputs = NodeOutputs::new();
        outputs.insert(Self::PORT_TEXT.to_string(), json!(text));
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_renders_numbers() {
        let mut inputs = NodeInputs::new();
        inputs.insert("text".to_string(), json!(42));
        let ctx = ExecutionContext::detached("exec");

        let TaskOutcome::Completed(outputs) = TextOutputTask.execute("out", inputs, &ctx).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outputs["text"], "42");
    }

    #[tokio::test]
    async fn test_missing_text_fails() {
        let ctx = ExecutionContext::detached("exec");
        let result = TextOutputTask.execute("out", NodeInputs::new(), &ctx).await;
        assert!(matches!(result, Err(NodeEngineError::MissingInput(port)) if port == "text"));
    }
}

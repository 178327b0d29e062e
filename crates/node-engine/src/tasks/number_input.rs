//! Number Input Task

use async_trait::async_trait;
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::task::{InputsExt, NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Provides a numeric literal, `0` when unset
pub struct NumberInputTask;

impl NumberInputTask {
    /// Port ID for the value, both as data key and output
    pub const PORT_VALUE: &'static str = "value";
}

impl TaskDescriptor for NumberInputTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "number-input".to_string(),
            category: NodeCategory::Input,
            label: "Number Input".to_string(),
            description: "Provides a numeric value to the workflow".to_string(),
            inputs: vec![PortDefinition::optional(
                Self::PORT_VALUE,
                "Value",
                PortDataType::Number,
            )],
            outputs: vec![PortDefinition::optional(
                Self::PORT_VALUE,
                "Value",
                PortDataType::Number,
            )],
            execution_mode: ExecutionMode::Reactive,
        }
    }
}

#[async_trait]
impl NodeExecutor for NumberInputTask {
    async fn execute(
        &self,
        _node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let value = inputs.get_number_or(Self::PORT_VALUE, 0.0);

        let mut outputs = NodeOutputs::new();
        outputs.insert(Self::PORT_VALUE.to_string(), json!(value));
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_number_defaults_to_zero() {
        let ctx = ExecutionContext::detached("exec");
        let outcome = NumberInputTask.execute("n", NodeInputs::new(), &ctx).await.unwrap();
        let TaskOutcome::Completed(outputs) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(outputs["value"], 0.0);
    }

    #[tokio::test]
    async fn test_number_passes_value() {
        let mut inputs = NodeInputs::new();
        inputs.insert("value".to_string(), json!(2.5));
        let ctx = ExecutionContext::detached("exec");
        let TaskOutcome::Completed(outputs) = NumberInputTask.execute("n", inputs, &ctx).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outputs["value"], 2.5);
    }
}

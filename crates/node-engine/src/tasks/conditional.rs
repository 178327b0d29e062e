//! Conditional Task
//!
//! Routes data based on a boolean condition.
//! This task enables branching in workflow graphs by directing
//! input values to different output ports based on a condition.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::task::{InputsExt, NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Conditional Task
///
/// When the condition is true, the value flows to `true_out` and
/// `false_out` carries null; when false, the other way round.
///
/// # Inputs
/// - `condition` (required) - Boolean condition
/// - `value` (required) - Value to route
pub struct ConditionalTask;

impl ConditionalTask {
    /// Port ID for condition input
    pub const PORT_CONDITION: &'static str = "condition";
    /// Port ID for value input
    pub const PORT_VALUE: &'static str = "value";
    /// Port ID for true output
    pub const PORT_TRUE_OUT: &'static str = "true_out";
    /// Port ID for false output
    pub const PORT_FALSE_OUT: &'static str = "false_out";
}

impl TaskDescriptor for ConditionalTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "conditional".to_string(),
            category: NodeCategory::Control,
            label: "Conditional".to_string(),
            description: "Routes data based on a boolean condition".to_string(),
            inputs: vec![
                PortDefinition::required(Self::PORT_CONDITION, "Condition", PortDataType::Boolean),
                PortDefinition::required(Self::PORT_VALUE, "Value", PortDataType::Any),
            ],
            outputs: vec![
                PortDefinition::optional(Self::PORT_TRUE_OUT, "True", PortDataType::Any),
                PortDefinition::optional(Self::PORT_FALSE_OUT, "False", PortDataType::Any),
            ],
            execution_mode: ExecutionMode::Reactive,
        }
    }
}

#[async_trait]
impl NodeExecutor for ConditionalTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let condition = inputs.get_bool(Self::PORT_CONDITION)?;
        let value = inputs
            .get(Self::PORT_VALUE)
            .cloned()
            .ok_or_else(|| NodeEngineError::MissingInput(Self::PORT_VALUE.to_string()))?;

        log::debug!("ConditionalTask {}: condition={}", node_id, condition);

        let (taken, other) = if condition {
            (Self::PORT_TRUE_OUT, Self::PORT_FALSE_OUT)
        } else {
            (Self::PORT_FALSE_OUT, Self::PORT_TRUE_OUT)
        };

        let mut outputs = NodeOutputs::new();
        outputs.insert(taken.to_string(), value);
        outputs.insert(other.to_string(), Value::Null);
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn route(condition: Value) -> Result<TaskOutcome> {
        let mut inputs = NodeInputs::new();
        inputs.insert("condition".to_string(), condition);
        inputs.insert("value".to_string(), json!({"answer": 42}));
        let ctx = ExecutionContext::detached("exec");
        ConditionalTask.execute("cond", inputs, &ctx).await
    }

    #[test]
    fn test_descriptor() {
        let meta = ConditionalTask::descriptor();
        assert_eq!(meta.node_type, "conditional");
        assert!(meta.input("condition").unwrap().required);
        assert!(meta.output("true_out").is_some());
        assert!(meta.output("false_out").is_some());
    }

    #[tokio::test]
    async fn test_route_to_true() {
        let TaskOutcome::Completed(outputs) = route(json!(true)).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outputs["true_out"], json!({"answer": 42}));
        assert_eq!(outputs["false_out"], Value::Null);
    }

    #[tokio::test]
    async fn test_route_to_false() {
        let TaskOutcome::Completed(outputs) = route(json!(false)).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outputs["false_out"], json!({"answer": 42}));
        assert_eq!(outputs["true_out"], Value::Null);
    }

    #[tokio::test]
    async fn test_non_boolean_condition_fails() {
        assert!(matches!(
            route(json!("yes")).await,
            Err(NodeEngineError::InvalidInputType { .. })
        ));
    }
}

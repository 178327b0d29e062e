//! Prompt Template Task
//!
//! Fills `{{name}}` placeholders in a template from a JSON object of
//! variables and emits the result as a prompt.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ExecutionContext;
use crate::error::{NodeEngineError, Result};
use crate::task::{InputsExt, NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

pub struct PromptTemplateTask;

impl PromptTemplateTask {
    /// Port ID for the template text
    pub const PORT_TEMPLATE: &'static str = "template";
    /// Port ID for the variables object
    pub const PORT_VARIABLES: &'static str = "variables";
    /// Port ID for the rendered prompt
    pub const PORT_PROMPT: &'static str = "prompt";
}

impl TaskDescriptor for PromptTemplateTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "prompt-template".to_string(),
            category: NodeCategory::Processing,
            label: "Prompt Template".to_string(),
            description: "Fills {{variable}} placeholders in a template".to_string(),
            inputs: vec![
                PortDefinition::required(Self::PORT_TEMPLATE, "Template", PortDataType::String),
                PortDefinition::optional(Self::PORT_VARIABLES, "Variables", PortDataType::Json),
            ],
            outputs: vec![PortDefinition::optional(
                Self::PORT_PROMPT,
                "Prompt",
                PortDataType::Prompt,
            )],
            execution_mode: ExecutionMode::Reactive,
        }
    }
}

/// Substitute every `{{key}}` whose key appears in `variables`
///
/// Unknown placeholders are left as-is.
pub fn render_template(template: &str, variables: &serde_json::Map<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), &text);
    }
    rendered
}

#[async_trait]
impl NodeExecutor for PromptTemplateTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let template = inputs.get_string(Self::PORT_TEMPLATE)?;
        let empty = serde_json::Map::new();
        let variables = match inputs.get(Self::PORT_VARIABLES) {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(NodeEngineError::InvalidInputType {
                    port: Self::PORT_VARIABLES.to_string(),
                    expected: "object".to_string(),
                })
            }
        };

        let prompt = render_template(template, variables);
        log::debug!(
            "PromptTemplateTask {}: substituted {} variables",
            node_id,
            variables.len()
        );

        let mut outputs = NodeOutputs::new();
        outputs.insert(Self::PORT_PROMPT.to_string(), json!(prompt));
        Ok(TaskOutcome::Completed(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let vars = json!({"name": "World", "count": 3});
        let rendered = render_template(
            "Hello {{name}}, {{count}} times {{missing}}",
            vars.as_object().unwrap(),
        );
        assert_eq!(rendered, "Hello World, 3 times {{missing}}");
    }

    #[tokio::test]
    async fn test_execute() {
        let mut inputs = NodeInputs::new();
        inputs.insert("template".to_string(), json!("Summarize: {{text}}"));
        inputs.insert("variables".to_string(), json!({"text": "a long story"}));
        let ctx = ExecutionContext::detached("exec");

        let TaskOutcome::Completed(outputs) = PromptTemplateTask.execute("tpl", inputs, &ctx).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(outputs["prompt"], "Summarize: a long story");
    }

    #[tokio::test]
    async fn test_rejects_non_object_variables() {
        let mut inputs = NodeInputs::new();
        inputs.insert("template".to_string(), json!("x"));
        inputs.insert("variables".to_string(), json!([1, 2]));
        let ctx = ExecutionContext::detached("exec");

        assert!(PromptTemplateTask.execute("tpl", inputs, &ctx).await.is_err());
    }
}

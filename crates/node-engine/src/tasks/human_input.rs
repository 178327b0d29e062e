//! Human Input Task
//!
//! The WaitForInput pattern for human-in-the-loop workflows. The node
//! suspends until a `user_response` is present, which the host supplies
//! by updating the node's data and demanding it again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ContextKeys;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::task::{InputsExt, NodeExecutor, NodeInputs, NodeOutputs, TaskDescriptor, TaskOutcome};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

/// Human Input Task
///
/// # Inputs
/// - `prompt` (optional) - Prompt to display to user
/// - `default` (optional) - Default value
/// - `auto_accept` (optional) - If true, accept the default without asking
/// - `user_response` (optional) - The user's response, set when resuming
///
/// # Outputs
/// - `value` - The user's input value
pub struct HumanInputTask;

impl HumanInputTask {
    /// Port ID for prompt input
    pub const PORT_PROMPT: &'static str = "prompt";
    /// Port ID for default value input
    pub const PORT_DEFAULT: &'static str = "default";
    /// Port ID for auto-accept flag
    pub const PORT_AUTO_ACCEPT: &'static str = "auto_accept";
    /// Port ID for user response (set when resuming)
    pub const PORT_USER_RESPONSE: &'static str = "user_response";
    /// Port ID for value output
    pub const PORT_VALUE: &'static str = "value";
}

/// State recorded in the run context while waiting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HumanInputState {
    waiting: bool,
    prompt: Option<String>,
}

impl TaskDescriptor for HumanInputTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "human-input".to_string(),
            category: NodeCategory::Input,
            label: "Human Input".to_string(),
            description: "Pauses workflow to wait for user input".to_string(),
            inputs: vec![
                PortDefinition::optional(Self::PORT_PROMPT, "Prompt", PortDataType::String),
                PortDefinition::optional(Self::PORT_DEFAULT, "Default Value", PortDataType::String),
                PortDefinition::optional(Self::PORT_AUTO_ACCEPT, "Auto Accept", PortDataType::Boolean),
                PortDefinition::optional(
                    Self::PORT_USER_RESPONSE,
                    "User Response",
                    PortDataType::String,
                ),
            ],
            outputs: vec![PortDefinition::optional(
                Self::PORT_VALUE,
                "Value",
                PortDataType::String,
            )],
            execution_mode: ExecutionMode::Manual,
        }
    }
}

#[async_trait]
impl NodeExecutor for HumanInputTask {
    async fn execute(
        &self,
        node_id: &str,
        inputs: NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<TaskOutcome> {
        let state_key = ContextKeys::meta(node_id, "state");

        let accepted = inputs
            .get_string_opt(Self::PORT_USER_RESPONSE)
            .or_else(|| {
                inputs
                    .get_bool_or(Self::PORT_AUTO_ACCEPT, false)
                    .then(|| inputs.get_string_opt(Self::PORT_DEFAULT))
                    .flatten()
            });

        if let Some(value) = accepted {
            ctx.set_value(&state_key, HumanInputState::default()).await;
            log::debug!("HumanInputTask {}: received input, continuing", node_id);

            let mut outputs = NodeOutputs::new();
            outputs.insert(Self::PORT_VALUE.to_string(), json!(value));
            return Ok(TaskOutcome::Completed(outputs));
        }

        let prompt = inputs.get_string_opt(Self::PORT_PROMPT).map(str::to_string);
        ctx.set_value(
            &state_key,
            HumanInputState {
                waiting: true,
                prompt: prompt.clone(),
            },
        )
        .await;

        log::debug!("HumanInputTask {}: waiting for input (prompt: {:?})", node_id, prompt);
        Ok(TaskOutcome::WaitingForInput { prompt })
    }
}

//! LLM Inference Task
//!
//! The metadata is known to the engine, but the effect depends on a model
//! server only the host can reach. Until the host binds it with
//! [`NodeRegistry::register_callback`](crate::NodeRegistry::register_callback),
//! running the node fails with a "requires host-specific executor" error.
//!
//! Bound callbacks should stream partial text through
//! `call.context.events().node_stream(node_id, "stream", chunk)` and
//! return the full `response` once done.

use crate::task::{Task, TaskDescriptor};
use crate::types::{ExecutionMode, NodeCategory, NodeDefinition, PortDataType, PortDefinition};

pub struct InferenceTask;

impl InferenceTask {
    /// Port ID for prompt input
    pub const PORT_PROMPT: &'static str = "prompt";
    /// Port ID for system prompt input
    pub const PORT_SYSTEM_PROMPT: &'static str = "system_prompt";
    /// Port ID for extra context input
    pub const PORT_CONTEXT: &'static str = "context";
    /// Port ID for the complete response output
    pub const PORT_RESPONSE: &'static str = "response";
    /// Port ID for streamed chunks
    pub const PORT_STREAM: &'static str = "stream";

    /// The placeholder task registered until the host binds a callback
    pub fn unbound() -> Task {
        Task::unbound("llm-inference")
    }
}

impl TaskDescriptor for InferenceTask {
    fn descriptor() -> NodeDefinition {
        NodeDefinition {
            node_type: "llm-inference".to_string(),
            category: NodeCategory::Processing,
            label: "LLM Inference".to_string(),
            description: "Runs a prompt through a language model".to_string(),
            inputs: vec![
                PortDefinition::required(Self::PORT_PROMPT, "Prompt", PortDataType::Prompt),
                PortDefinition::optional(
                    Self::PORT_SYSTEM_PROMPT,
                    "System Prompt",
                    PortDataType::String,
                ),
                PortDefinition::optional(Self::PORT_CONTEXT, "Context", PortDataType::String),
            ],
            outputs: vec![
                PortDefinition::optional(Self::PORT_RESPONSE, "Response", PortDataType::String),
                PortDefinition::optional(Self::PORT_STREAM, "Stream", PortDataType::Stream),
            ],
            execution_mode: ExecutionMode::Stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::task::NodeInputs;

    #[test]
    fn test_descriptor() {
        let meta = InferenceTask::descriptor();
        assert_eq!(meta.node_type, "llm-inference");
        assert_eq!(meta.execution_mode, ExecutionMode::Stream);
        assert!(meta.input("prompt").unwrap().required);
    }

    #[tokio::test]
    async fn test_unbound_requires_host() {
        let ctx = ExecutionContext::detached("exec");
        let task = InferenceTask::unbound();
        assert!(!task.is_host_bound());

        let err = task
            .run("llm", "llm-inference", NodeInputs::new(), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires host-specific executor"));
    }
}

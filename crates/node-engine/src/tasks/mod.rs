//! Built-in node types
//!
//! Every built-in is listed in [`builtin_nodes`]; there is no link-time
//! discovery. Adding a node type means adding its module here and one
//! line to that list.
//!
//! Completed outputs are mirrored into the run-scoped context under
//! well-defined keys, so hosts and later nodes can read them by name.
//!
//! # Key Conventions
//!
//! - Inputs: `{node_id}.input.{port_name}`
//! - Outputs: `{node_id}.output.{port_name}`
//! - Streaming: `{node_id}.stream.{port_name}`
//! - Task state: `{node_id}.meta.{field}`

mod conditional;
mod human_input;
mod inference;
mod merge;
mod number_input;
mod prompt_template;
mod text_input;
mod text_output;

pub use conditional::ConditionalTask;
pub use human_input::HumanInputTask;
pub use inference::InferenceTask;
pub use merge::{MergeConfig, MergeTask};
pub use number_input::NumberInputTask;
pub use prompt_template::PromptTemplateTask;
pub use text_input::TextInputTask;
pub use text_output::TextOutputTask;

use crate::task::{Task, TaskDescriptor};
use crate::types::NodeDefinition;

/// The explicit registration list of built-in node types
pub fn builtin_nodes() -> Vec<(NodeDefinition, Task)> {
    vec![
        (TextInputTask::descriptor(), Task::builtin(TextInputTask)),
        (NumberInputTask::descriptor(), Task::builtin(NumberInputTask)),
        (HumanInputTask::descriptor(), Task::builtin(HumanInputTask)),
        (PromptTemplateTask::descriptor(), Task::builtin(PromptTemplateTask)),
        (InferenceTask::descriptor(), InferenceTask::unbound()),
        (MergeTask::descriptor(), Task::builtin(MergeTask::default())),
        (ConditionalTask::descriptor(), Task::builtin(ConditionalTask)),
        (TextOutputTask::descriptor(), Task::builtin(TextOutputTask)),
    ]
}

/// Helper for building run-context keys
pub struct ContextKeys;

impl ContextKeys {
    /// Build an input key: `{node_id}.input.{port}`
    pub fn input(node_id: &str, port: &str) -> String {
        format!("{}.input.{}", node_id, port)
    }

    /// Build an output key: `{node_id}.output.{port}`
    pub fn output(node_id: &str, port: &str) -> String {
        format!("{}.output.{}", node_id, port)
    }

    /// Build a stream key: `{node_id}.stream.{port}`
    pub fn stream(node_id: &str, port: &str) -> String {
        format!("{}.stream.{}", node_id, port)
    }

    /// Build a metadata key: `{node_id}.meta.{field}`
    pub fn meta(node_id: &str, field: &str) -> String {
        format!("{}.meta.{}", node_id, field)
    }
}

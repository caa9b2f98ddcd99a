use serde::{Serialize, Deserialize};
use serde_json::Value;

/// One (block × composition) unit of work, as produced by the build step.
/// Paths are kept as raw strings and validated when the queue is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub composition_index: u64,
    pub block_path: String,
    #[serde(default)]
    pub parent_path: Option<String>,
    /// Opaque to the executor; handed to every hook call as-is.
    #[serde(default)]
    pub prompt: Value,
}

impl ExecutionJob {
    pub fn new(block_path: impl Into<String>, composition_index: u64) -> Self {
        let block_path = block_path.into();
        let parent_path = block_path
            .rsplit_once('.')
            .map(|(parent, _)| parent.to_string());
        Self {
            composition_index,
            block_path,
            parent_path,
            prompt: Value::Null,
        }
    }

    pub fn with_parent(mut self, parent_path: Option<String>) -> Self {
        self.parent_path = parent_path;
        self
    }

    pub fn with_prompt(mut self, prompt: Value) -> Self {
        self.prompt = prompt;
        self
    }
}

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use crate::tree::BlockPath;

/// 钩子上下文 (Hook Context)
/// Everything a hook sees for one stage call. Built fresh by the executor for
/// every call, so hooks never observe executor state directly.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    pub run_id: Uuid,
    pub block_path: BlockPath,
    pub composition_index: u64,
    /// Cached `resolve` data of this block; `None` until resolve has run.
    pub resolve_data: Option<Value>,
    /// Latest `generate` data of the nearest ancestor that has one.
    pub parent_result: Option<Value>,
    pub prompt: Value,
}

impl HookContext {
    pub fn prompt_field(&self, key: &str) -> Option<&Value> {
        self.prompt.get(key)
    }

    pub fn parent_field(&self, key: &str) -> Option<&Value> {
        self.parent_result.as_ref().and_then(|v| v.get(key))
    }

    pub fn is_root(&self) -> bool {
        self.block_path.parent().is_none()
    }
}

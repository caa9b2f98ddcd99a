use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use crate::hooks::{Hook, HookResult};
use crate::runtime::context::HookContext;

/// Renders each block's substituted text, prefixed by the text its parent
/// rendered for the same composition. Logs every stage.
#[derive(Debug)]
pub struct TemplateHook {
    /// Joins parent and child text.
    pub separator: String,
}

impl TemplateHook {
    pub fn new() -> Self {
        Self {
            separator: ", ".to_string(),
        }
    }

    fn block_text(ctx: &HookContext) -> String {
        ctx.prompt_field("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

impl Default for TemplateHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for TemplateHook {
    async fn node_start(&self, ctx: &HookContext) -> HookResult {
        info!("[{}] node_start", ctx.block_path);
        HookResult::success()
    }

    async fn resolve(&self, ctx: &HookContext) -> HookResult {
        let template = ctx.prompt_field("template").cloned().unwrap_or(Value::Null);
        let wildcards = ctx.prompt_field("bindings")
            .and_then(|v| v.as_object())
            .map(|m| m.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        info!("[{}] resolve: {} wildcard(s)", ctx.block_path, wildcards.len());
        HookResult::with_data(json!({ "template": template, "wildcards": wildcards }))
    }

    async fn generate(&self, ctx: &HookContext) -> HookResult {
        let own = Self::block_text(ctx);
        let text = match ctx.parent_field("text").and_then(|v| v.as_str()) {
            Some(parent) if !parent.is_empty() && !own.is_empty() => {
                format!("{}{}{}", parent, self.separator, own)
            }
            Some(parent) if own.is_empty() => parent.to_string(),
            _ => own,
        };
        info!("[{}#{}] {}", ctx.block_path, ctx.composition_index, text);
        HookResult::with_data(json!({ "text": text }))
    }

    async fn node_end(&self, ctx: &HookContext) -> HookResult {
        info!("[{}] node_end", ctx.block_path);
        HookResult::success()
    }
}

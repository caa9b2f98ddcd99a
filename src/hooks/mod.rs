use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::debug;
use crate::runtime::context::HookContext;

pub mod builtin;

/// Lifecycle stages, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NodeStart,
    Resolve,
    Pre,
    Generate,
    Post,
    NodeEnd,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::NodeStart,
        Stage::Resolve,
        Stage::Pre,
        Stage::Generate,
        Stage::Post,
        Stage::NodeEnd,
    ];

    /// Stages fired once per composition.
    pub const PER_COMPOSITION: [Stage; 3] = [Stage::Pre, Stage::Generate, Stage::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NodeStart => "node_start",
            Stage::Resolve => "resolve",
            Stage::Pre => "pre",
            Stage::Generate => "generate",
            Stage::Post => "post",
            Stage::NodeEnd => "node_end",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    Success,
    Error,
}

/// Machine-readable code plus the message shown to users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    pub status: HookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HookResult {
    pub fn success() -> Self {
        Self {
            status: HookStatus::Success,
            data: None,
            error: None,
            message: None,
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HookStatus::Error,
            data: None,
            error: Some(HookError {
                code: code.into(),
                message: message.into(),
            }),
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == HookStatus::Success
    }
}

/// 钩子接口：每个阶段一个方法，默认直接成功
/// A hook only overrides the stages it cares about.
#[async_trait]
pub trait Hook: Send + Sync + fmt::Debug {
    async fn node_start(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }

    async fn resolve(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }

    async fn pre(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }

    async fn generate(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }

    async fn post(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }

    async fn node_end(&self, _ctx: &HookContext) -> HookResult {
        HookResult::success()
    }
}

/// Adapts a plain `(stage, context) -> result` callable to [`Hook`].
pub struct FnHook<F> {
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(Stage, &HookContext) -> HookResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(Stage, &HookContext) -> HookResult + Send + Sync,
{
    async fn node_start(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::NodeStart, ctx)
    }

    async fn resolve(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::Resolve, ctx)
    }

    async fn pre(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::Pre, ctx)
    }

    async fn generate(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::Generate, ctx)
    }

    async fn post(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::Post, ctx)
    }

    async fn node_end(&self, ctx: &HookContext) -> HookResult {
        (self.f)(Stage::NodeEnd, ctx)
    }
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub result: HookResult,
    pub elapsed: Duration,
}

/// Dispatches a [`Stage`] to the matching hook method and times the call.
/// No retries: whatever the hook returns is final.
#[derive(Debug, Clone)]
pub struct HookPipeline {
    hook: Arc<dyn Hook>,
}

impl HookPipeline {
    pub fn new(hook: Arc<dyn Hook>) -> Self {
        Self { hook }
    }

    pub async fn invoke(&self, stage: Stage, ctx: &HookContext) -> StageOutcome {
        let start = Instant::now();
        let result = match stage {
            Stage::NodeStart => self.hook.node_start(ctx).await,
            Stage::Resolve => self.hook.resolve(ctx).await,
            Stage::Pre => self.hook.pre(ctx).await,
            Stage::Generate => self.hook.generate(ctx).await,
            Stage::Post => self.hook.post(ctx).await,
            Stage::NodeEnd => self.hook.node_end(ctx).await,
        };
        let elapsed = start.elapsed();

        debug!(
            block = %ctx.block_path,
            composition = ctx.composition_index,
            stage = %stage,
            status = ?result.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "hook returned"
        );

        StageOutcome { result, elapsed }
    }
}

//! Composition indexing and depth-first hook execution for wildcard-templated
//! prompt trees.

pub mod compiler;
pub mod error;
pub mod hooks;
pub mod indexer;
pub mod runtime;
pub mod tree;

pub use error::{ExecutorError, IndexError, StructuralError};
pub use hooks::{FnHook, Hook, HookError, HookPipeline, HookResult, HookStatus, Stage};
pub use indexer::{CompositionIndices, CompositionSpace, Dimension, composition_to_indices};
pub use runtime::context::HookContext;
pub use runtime::events::{ProgressEvent, ProgressSender, progress_channel};
pub use runtime::executor::{ExecutorConfig, TreeExecutor};
pub use runtime::job::ExecutionJob;
pub use runtime::state::{BlockState, ExecutorStats, RunState};
pub use tree::{BlockPath, BlockSpec, PromptTree};

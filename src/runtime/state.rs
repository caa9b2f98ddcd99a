use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::hooks::{HookError, HookResult, Stage};
use crate::runtime::queue::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Complete,
    Error,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Complete => "complete",
            RunState::Error => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    Running,
    Complete,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockProgress {
    pub completed: usize,
    /// `node_end` has fired.
    pub ended: bool,
}

/// Where and why a block failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFailure {
    pub stage: Stage,
    pub error: HookError,
}

/// 执行器状态 (Executor State)
/// Created fresh for every run and owned by exactly one executor.
#[derive(Debug)]
pub struct ExecutorState {
    pub run_id: Uuid,
    pub state: RunState,
    pub queue_position: usize,
    pub completed_compositions: usize,
    /// Blocks whose `node_start` / `resolve` have fired.
    pub visited_blocks: HashSet<BlockId>,
    pub resolve_cache: HashMap<BlockId, HookResult>,
    /// `generate` results keyed by (block, composition).
    pub variation_results: HashMap<(BlockId, u64), HookResult>,
    /// Composition of each block's most recent recorded `generate`.
    pub last_generated: HashMap<BlockId, u64>,
    pub block_states: HashMap<BlockId, BlockState>,
    pub failed_blocks: HashSet<BlockId>,
    pub blocked_blocks: HashSet<BlockId>,
    pub failures: HashMap<BlockId, BlockFailure>,
    pub progress: HashMap<BlockId, BlockProgress>,
    /// Diagnostic only.
    pub stage_times: HashMap<BlockId, HashMap<Stage, Vec<Duration>>>,
}

impl ExecutorState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            queue_position: 0,
            completed_compositions: 0,
            visited_blocks: HashSet::new(),
            resolve_cache: HashMap::new(),
            variation_results: HashMap::new(),
            last_generated: HashMap::new(),
            block_states: HashMap::new(),
            failed_blocks: HashSet::new(),
            blocked_blocks: HashSet::new(),
            failures: HashMap::new(),
            progress: HashMap::new(),
            stage_times: HashMap::new(),
        }
    }

    /// Failed or blocked: no further hooks fire for the block.
    pub fn is_halted(&self, block: BlockId) -> bool {
        self.failed_blocks.contains(&block) || self.blocked_blocks.contains(&block)
    }

    pub fn record_time(&mut self, block: BlockId, stage: Stage, elapsed: Duration) {
        self.stage_times
            .entry(block)
            .or_default()
            .entry(stage)
            .or_default()
            .push(elapsed);
    }

    pub fn total_time(&self, block: BlockId) -> Duration {
        self.stage_times
            .get(&block)
            .map(|stages| stages.values().flatten().sum())
            .unwrap_or_default()
    }
}

impl Default for ExecutorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial progress of a failed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBlock {
    pub completed: usize,
    pub total: usize,
    pub stage: Stage,
    pub error: HookError,
}

/// Point-in-time snapshot returned by `stats()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub run_id: Uuid,
    pub state: RunState,
    pub queue_position: usize,
    pub completed_compositions: usize,
    pub total_compositions: usize,
    pub complete_blocks: usize,
    pub failed_blocks: usize,
    pub blocked_blocks: usize,
    pub failures: BTreeMap<String, FailedBlock>,
    /// Blocked by an ancestor's failure, in path order.
    pub blocked: Vec<String>,
}

use std::collections::BTreeMap;
use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use crate::error::ExecutorError;
use crate::hooks::{Hook, HookError, HookPipeline, HookResult, Stage};
use crate::runtime::context::HookContext;
use crate::runtime::control::StopHandle;
use crate::runtime::events::{EventSender, ProgressEvent, ProgressSender};
use crate::runtime::job::ExecutionJob;
use crate::runtime::queue::{BlockId, ExecutionQueue, QueueEntry};
use crate::runtime::state::{
    BlockFailure, BlockState, ExecutorState, ExecutorStats, FailedBlock, RunState,
};
use crate::tree::BlockPath;

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Size of the composition space. Jobs at or beyond it are rejected.
    pub cardinality: Option<u64>,
}

/// 树执行器 (Tree Executor)
///
/// Walks the depth-first queue with a single cursor:
/// `node_start` and `resolve` on a block's first entry, then
/// `pre` / `generate` / `post` per composition, and `node_end` once the
/// block's last entry has been handled. A hook error fails the block and
/// blocks its whole subtree; unrelated subtrees keep running.
pub struct TreeExecutor {
    pipeline: HookPipeline,
    config: ExecutorConfig,
    event_tx: Option<ProgressSender>,
    stop: StopHandle,
    jobs: Vec<ExecutionJob>,
    queue: ExecutionQueue,
    state: ExecutorState,
}

impl TreeExecutor {
    pub fn new(hook: Arc<dyn Hook>) -> Self {
        Self {
            pipeline: HookPipeline::new(hook),
            config: ExecutorConfig::default(),
            event_tx: None,
            stop: StopHandle::new(),
            jobs: Vec::new(),
            queue: ExecutionQueue::default(),
            state: ExecutorState::new(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Handle for requesting a pause from a hook or another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Requests a cooperative pause before the next queue entry.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn state(&self) -> RunState {
        self.state.state
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    pub fn queue_position(&self) -> usize {
        self.state.queue_position
    }

    pub fn block_state(&self, path: &str) -> Option<BlockState> {
        let id = self.lookup(path)?;
        self.state.block_states.get(&id).copied()
    }

    pub fn resolve_data(&self, path: &str) -> Option<&Value> {
        let id = self.lookup(path)?;
        self.state.resolve_cache.get(&id)?.data.as_ref()
    }

    pub fn variation_result(&self, path: &str, composition_index: u64) -> Option<&HookResult> {
        let id = self.lookup(path)?;
        self.state.variation_results.get(&(id, composition_index))
    }

    fn lookup(&self, path: &str) -> Option<BlockId> {
        let path: BlockPath = path.parse().ok()?;
        self.queue.block_id(&path)
    }

    /// Starts a fresh run over `jobs`, discarding any previous state.
    /// Structural problems are reported before any hook fires.
    pub async fn run(&mut self, jobs: Vec<ExecutionJob>) -> Result<ExecutorStats, ExecutorError> {
        self.state = ExecutorState::new();
        self.queue = ExecutionQueue::default();
        self.jobs.clear();
        self.stop.clear();

        let queue = match ExecutionQueue::build(&jobs, self.config.cardinality) {
            Ok(queue) => queue,
            Err(e) => {
                error!(run_id = %self.state.run_id, error = %e, "Rejected job list");
                self.state.state = RunState::Error;
                return Err(e.into());
            }
        };

        info!(
            run_id = %self.state.run_id,
            entries = queue.len(),
            blocks = queue.blocks().len(),
            "Run started"
        );
        self.queue = queue;
        self.jobs = jobs;
        self.drive().await
    }

    /// Continues a paused run at the saved cursor. Blocks that were already
    /// visited do not see `node_start` or `resolve` again.
    pub async fn resume(&mut self) -> Result<ExecutorStats, ExecutorError> {
        if self.state.state != RunState::Paused {
            return Err(ExecutorError::NotPaused(self.state.state));
        }
        self.stop.clear();
        info!(
            run_id = %self.state.run_id,
            position = self.state.queue_position,
            "Run resumed"
        );
        self.drive().await
    }

    async fn drive(&mut self) -> Result<ExecutorStats, ExecutorError> {
        self.state.state = RunState::Running;

        while self.state.queue_position < self.queue.len() {
            let position = self.state.queue_position;
            let entry = self.queue.entries()[position];
            self.process(position, entry).await;
            self.state.queue_position += 1;

            if self.stop.take() && self.state.queue_position < self.queue.len() {
                self.state.state = RunState::Paused;
                info!(
                    run_id = %self.state.run_id,
                    position = self.state.queue_position,
                    "Run paused"
                );
                self.event_tx.send_event(ProgressEvent::RunPaused {
                    queue_position: self.state.queue_position,
                    global_completed: self.state.completed_compositions,
                    global_total: self.queue.len(),
                });
                return Ok(self.stats());
            }
        }

        let roots = self.queue.roots();
        let all_roots_failed =
            !roots.is_empty() && roots.iter().all(|r| self.state.failed_blocks.contains(r));
        self.state.state = if all_roots_failed {
            RunState::Error
        } else {
            RunState::Complete
        };

        let stats = self.stats();
        info!(
            run_id = %self.state.run_id,
            state = %stats.state,
            completed = stats.completed_compositions,
            total = stats.total_compositions,
            failed = stats.failed_blocks,
            blocked = stats.blocked_blocks,
            "Run finished"
        );
        self.event_tx.send_event(ProgressEvent::RunComplete {
            stats: stats.clone(),
        });
        Ok(stats)
    }

    async fn process(&mut self, position: usize, entry: QueueEntry) {
        let id = entry.block;
        if self.state.is_halted(id) {
            return;
        }

        if !self.state.visited_blocks.contains(&id) {
            let culprit = self
                .queue
                .ancestors(id)
                .find(|&a| self.state.is_halted(a));
            if let Some(culprit) = culprit {
                self.mark_blocked(id, culprit).await;
                return;
            }
            if !self.enter_block(entry).await {
                return;
            }
        }

        if !self.run_composition(entry).await {
            return;
        }

        if position == self.queue.block(id).last_position {
            self.complete_block(entry).await;
        }
    }

    /// Fires `node_start` and `resolve`. Returns false if the block failed.
    async fn enter_block(&mut self, entry: QueueEntry) -> bool {
        let id = entry.block;
        self.state.visited_blocks.insert(id);
        self.state.block_states.insert(id, BlockState::Running);
        self.state.progress.entry(id).or_default();

        let node = self.queue.block(id);
        debug!(block = %node.path, total = node.total(), "Entering block");
        self.event_tx.send_event(ProgressEvent::BlockStart {
            block_path: node.path.to_string(),
            total: node.total(),
            global_completed: self.state.completed_compositions,
            global_total: self.queue.len(),
        });

        for stage in [Stage::NodeStart, Stage::Resolve] {
            let result = self.invoke(stage, entry).await;
            if let Some(error) = failure_of(&result) {
                self.fail_block(id, stage, error).await;
                return false;
            }
            if stage == Stage::Resolve {
                self.state.resolve_cache.insert(id, result);
            }
        }
        true
    }

    /// Fires `pre`, `generate`, `post`. Returns false if the block failed.
    async fn run_composition(&mut self, entry: QueueEntry) -> bool {
        let id = entry.block;
        for stage in Stage::PER_COMPOSITION {
            let result = self.invoke(stage, entry).await;
            if let Some(error) = failure_of(&result) {
                self.fail_block(id, stage, error).await;
                return false;
            }
            if stage == Stage::Generate {
                self.state
                    .variation_results
                    .insert((id, entry.composition_index), result);
                self.state.last_generated.insert(id, entry.composition_index);
            }
        }

        self.state.completed_compositions += 1;
        let progress = self.state.progress.entry(id).or_default();
        progress.completed += 1;
        let completed = progress.completed;

        let node = self.queue.block(id);
        self.event_tx.send_event(ProgressEvent::CompositionComplete {
            block_path: node.path.to_string(),
            composition_index: entry.composition_index,
            completed,
            total: node.total(),
            global_completed: self.state.completed_compositions,
            global_total: self.queue.len(),
        });
        true
    }

    async fn complete_block(&mut self, entry: QueueEntry) {
        let id = entry.block;
        if let Some(result) = self.end_block(id, entry.composition_index).await {
            if let Some(error) = failure_of(&result) {
                self.fail_block(id, Stage::NodeEnd, error).await;
                return;
            }
        }

        self.state.block_states.insert(id, BlockState::Complete);
        let node = self.queue.block(id);
        let completed = self.completed_of(id);
        let elapsed = self.state.total_time(id);

        self.log_stage_times(id);
        debug!(block = %node.path, completed, "Block complete");
        self.event_tx.send_event(ProgressEvent::BlockComplete {
            block_path: node.path.to_string(),
            completed,
            total: node.total(),
            time_ms: elapsed.as_secs_f64() * 1000.0,
        });
    }

    /// Fires `node_end` once for a visited block. `None` if it already fired
    /// or the block never started.
    async fn end_block(&mut self, id: BlockId, composition_index: u64) -> Option<HookResult> {
        if !self.state.visited_blocks.contains(&id) {
            return None;
        }
        let progress = self.state.progress.entry(id).or_default();
        if progress.ended {
            return None;
        }
        progress.ended = true;

        let job = self.queue.block(id).job_for(composition_index)?;
        Some(
            self.invoke(
                Stage::NodeEnd,
                QueueEntry {
                    block: id,
                    composition_index,
                    job,
                },
            )
            .await,
        )
    }

    async fn fail_block(&mut self, id: BlockId, stage: Stage, error: HookError) {
        self.state.block_states.insert(id, BlockState::Failed);
        self.state.failed_blocks.insert(id);
        self.state.failures.insert(
            id,
            BlockFailure {
                stage,
                error: error.clone(),
            },
        );

        let node = self.queue.block(id);
        warn!(
            block = %node.path,
            stage = %stage,
            code = %error.code,
            "Block failed: {}",
            error.message
        );

        let last = node.compositions.last().copied().unwrap_or_default();
        if let Some(result) = self.end_block(id, last).await {
            if !result.is_success() {
                warn!(block = %self.queue.block(id).path, "node_end failed on a failed block");
            }
        }
        self.log_stage_times(id);

        let node = self.queue.block(id);
        self.event_tx.send_event(ProgressEvent::BlockFailed {
            block_path: node.path.to_string(),
            completed: self.completed_of(id),
            total: node.total(),
            stage,
            error,
        });

        for descendant in self.queue.descendants(id) {
            let settled = matches!(
                self.state.block_states.get(&descendant),
                Some(BlockState::Complete | BlockState::Failed | BlockState::Blocked)
            );
            if !settled {
                self.mark_blocked(descendant, id).await;
            }
        }
    }

    async fn mark_blocked(&mut self, id: BlockId, culprit: BlockId) {
        self.state.block_states.insert(id, BlockState::Blocked);
        self.state.blocked_blocks.insert(id);

        // A block already under way still gets its node_end.
        let last = self.queue.block(id).compositions.last().copied().unwrap_or_default();
        if let Some(result) = self.end_block(id, last).await {
            if !result.is_success() {
                warn!(block = %self.queue.block(id).path, "node_end failed on a blocked block");
            }
        }

        let node = self.queue.block(id);
        let blocked_by = self.queue.block(culprit).path.to_string();
        warn!(block = %node.path, blocked_by = %blocked_by, "Block blocked by ancestor failure");
        self.event_tx.send_event(ProgressEvent::BlockBlocked {
            block_path: node.path.to_string(),
            total: node.total(),
            blocked_by,
        });
    }

    async fn invoke(&mut self, stage: Stage, entry: QueueEntry) -> HookResult {
        let ctx = self.context(entry);
        let outcome = self.pipeline.invoke(stage, &ctx).await;
        self.state.record_time(entry.block, stage, outcome.elapsed);

        self.event_tx.send_event(ProgressEvent::Stage {
            block_path: ctx.block_path.to_string(),
            composition_index: entry.composition_index,
            stage,
            status: outcome.result.status,
            time_ms: outcome.elapsed.as_secs_f64() * 1000.0,
        });
        outcome.result
    }

    fn context(&self, entry: QueueEntry) -> HookContext {
        let id = entry.block;
        HookContext {
            run_id: self.state.run_id,
            block_path: self.queue.block(id).path.clone(),
            composition_index: entry.composition_index,
            resolve_data: self
                .state
                .resolve_cache
                .get(&id)
                .and_then(|r| r.data.clone()),
            parent_result: self.parent_result(id),
            prompt: self
                .jobs
                .get(entry.job)
                .map(|j| j.prompt.clone())
                .unwrap_or(Value::Null),
        }
    }

    /// Latest `generate` data of the nearest ancestor that recorded one.
    fn parent_result(&self, id: BlockId) -> Option<Value> {
        self.queue
            .ancestors(id)
            .find_map(|a| {
                let index = self.state.last_generated.get(&a)?;
                self.state.variation_results.get(&(a, *index))
            })
            .and_then(|r| r.data.clone())
    }

    fn completed_of(&self, id: BlockId) -> usize {
        self.state.progress.get(&id).map(|p| p.completed).unwrap_or(0)
    }

    fn log_stage_times(&self, id: BlockId) {
        let Some(stages) = self.state.stage_times.get(&id) else {
            return;
        };
        let node = self.queue.block(id);
        for stage in Stage::ALL {
            if let Some(times) = stages.get(&stage) {
                let total: std::time::Duration = times.iter().sum();
                debug!(
                    block = %node.path,
                    stage = %stage,
                    calls = times.len(),
                    total_ms = total.as_secs_f64() * 1000.0,
                    "Stage timings"
                );
            }
        }
    }

    /// Point-in-time snapshot of the run.
    pub fn stats(&self) -> ExecutorStats {
        let blocks = self.queue.blocks();
        let mut ids: Vec<BlockId> = (0..blocks.len()).collect();
        ids.sort_by(|a, b| blocks[*a].path.cmp(&blocks[*b].path));

        let mut complete_blocks = 0;
        let mut failures = BTreeMap::new();
        let mut blocked = Vec::new();

        for id in ids {
            let node = &blocks[id];
            match self.state.block_states.get(&id) {
                Some(BlockState::Complete) => complete_blocks += 1,
                Some(BlockState::Failed) => {
                    if let Some(failure) = self.state.failures.get(&id) {
                        failures.insert(
                            node.path.to_string(),
                            FailedBlock {
                                completed: self.completed_of(id),
                                total: node.total(),
                                stage: failure.stage,
                                error: failure.error.clone(),
                            },
                        );
                    }
                }
                Some(BlockState::Blocked) => blocked.push(node.path.to_string()),
                Some(BlockState::Running) | None => {}
            }
        }

        ExecutorStats {
            run_id: self.state.run_id,
            state: self.state.state,
            queue_position: self.state.queue_position,
            completed_compositions: self.state.completed_compositions,
            total_compositions: self.queue.len(),
            complete_blocks,
            failed_blocks: self.state.failed_blocks.len(),
            blocked_blocks: blocked.len(),
            failures,
            blocked,
        }
    }
}

fn failure_of(result: &HookResult) -> Option<HookError> {
    if result.is_success() {
        return None;
    }
    Some(result.error.clone().unwrap_or_else(|| HookError {
        code: "hook_error".to_string(),
        message: result
            .message
            .clone()
            .unwrap_or_else(|| "hook reported an error".to_string()),
    }))
}

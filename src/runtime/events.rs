// Progress events pushed to an external sink during a run.

use serde::Serialize;
use tokio::sync::mpsc;
use crate::hooks::{HookError, HookStatus, Stage};
use crate::runtime::state::ExecutorStats;

/// Unbounded: the sink must keep up or buffer.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Serializes as `{"event": "<name>", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ProgressEvent {
    BlockStart {
        block_path: String,
        total: usize,
        global_completed: usize,
        global_total: usize,
    },

    Stage {
        block_path: String,
        composition_index: u64,
        stage: Stage,
        status: HookStatus,
        time_ms: f64,
    },

    CompositionComplete {
        block_path: String,
        composition_index: u64,
        completed: usize,
        total: usize,
        global_completed: usize,
        global_total: usize,
    },

    BlockComplete {
        block_path: String,
        completed: usize,
        total: usize,
        time_ms: f64,
    },

    BlockFailed {
        block_path: String,
        completed: usize,
        total: usize,
        stage: Stage,
        error: HookError,
    },

    /// Skipped because an ancestor failed.
    BlockBlocked {
        block_path: String,
        total: usize,
        blocked_by: String,
    },

    RunPaused {
        queue_position: usize,
        global_completed: usize,
        global_total: usize,
    },

    RunComplete { stats: ExecutorStats },
}

impl ProgressEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::BlockStart { .. } => "block_start",
            ProgressEvent::Stage { .. } => "stage",
            ProgressEvent::CompositionComplete { .. } => "composition_complete",
            ProgressEvent::BlockComplete { .. } => "block_complete",
            ProgressEvent::BlockFailed { .. } => "block_failed",
            ProgressEvent::BlockBlocked { .. } => "block_blocked",
            ProgressEvent::RunPaused { .. } => "run_paused",
            ProgressEvent::RunComplete { .. } => "run_complete",
        }
    }
}

/// Fire-and-forget sending; a dropped receiver is not an executor error.
pub trait EventSender {
    fn send_event(&self, event: ProgressEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ProgressEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

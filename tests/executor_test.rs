use wildcomp::runtime::control::StopHandle;
use wildcomp::runtime::events::progress_channel;
use wildcomp::{
    BlockState, ExecutionJob, ExecutorConfig, ExecutorError, FnHook, Hook, HookContext,
    HookResult, ProgressEvent, RunState, Stage, TreeExecutor,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, PartialEq)]
struct Call {
    stage: Stage,
    block: String,
    index: u64,
    resolve_data: Option<Value>,
    parent_result: Option<Value>,
}

type Log = Arc<Mutex<Vec<Call>>>;

/// Wraps `f` so every call is appended to the returned log.
fn recording<F>(f: F) -> (Arc<dyn Hook>, Log)
where
    F: Fn(Stage, &HookContext) -> HookResult + Send + Sync + 'static,
{
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let hook = FnHook::new(move |stage, ctx: &HookContext| {
        sink.lock().unwrap().push(Call {
            stage,
            block: ctx.block_path.to_string(),
            index: ctx.composition_index,
            resolve_data: ctx.resolve_data.clone(),
            parent_result: ctx.parent_result.clone(),
        });
        f(stage, ctx)
    });
    (Arc::new(hook), log)
}

fn jobs(blocks: &[(&str, u64)]) -> Vec<ExecutionJob> {
    blocks
        .iter()
        .flat_map(|(path, count)| (0..*count).map(move |i| ExecutionJob::new(*path, i)))
        .collect()
}

fn calls_of(log: &Log, block: &str, stage: Stage) -> Vec<Call> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|c| c.block == block && c.stage == stage)
        .cloned()
        .collect()
}

/// Appends `path#index` to the parent's text.
fn chain_text(stage: Stage, ctx: &HookContext) -> HookResult {
    if stage != Stage::Generate {
        return HookResult::success();
    }
    let own = format!("{}#{}", ctx.block_path, ctx.composition_index);
    let text = match ctx.parent_field("text").and_then(Value::as_str) {
        Some(parent) => format!("{}/{}", parent, own),
        None => own,
    };
    HookResult::with_data(json!({ "text": text }))
}

fn generated_text(executor: &TreeExecutor, block: &str, index: u64) -> String {
    executor
        .variation_result(block, index)
        .and_then(|r| r.data.as_ref())
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_single_block_lifecycle() {
    let (hook, log) = recording(|_, _| HookResult::success());
    let mut executor = TreeExecutor::new(hook);

    let stats = executor.run(jobs(&[("0", 2)])).await.unwrap();
    assert_eq!(stats.state, RunState::Complete);
    assert_eq!(stats.completed_compositions, 2);
    assert_eq!(stats.complete_blocks, 1);

    let stages: Vec<Stage> = log.lock().unwrap().iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::NodeStart,
            Stage::Resolve,
            Stage::Pre,
            Stage::Generate,
            Stage::Post,
            Stage::Pre,
            Stage::Generate,
            Stage::Post,
            Stage::NodeEnd,
        ]
    );
    assert_eq!(executor.block_state("0"), Some(BlockState::Complete));
}

#[tokio::test]
async fn test_resolve_runs_once_and_is_shared() {
    let (hook, log) = recording(|stage, _| match stage {
        Stage::Resolve => HookResult::with_data(json!({ "seed": 7 })),
        _ => HookResult::success(),
    });
    let mut executor = TreeExecutor::new(hook);
    executor.run(jobs(&[("0", 3)])).await.unwrap();

    assert_eq!(calls_of(&log, "0", Stage::NodeStart).len(), 1);
    assert_eq!(calls_of(&log, "0", Stage::Resolve).len(), 1);
    assert_eq!(calls_of(&log, "0", Stage::NodeEnd).len(), 1);

    let generates = calls_of(&log, "0", Stage::Generate);
    assert_eq!(generates.len(), 3);
    for call in generates {
        assert_eq!(call.resolve_data, Some(json!({ "seed": 7 })));
    }

    let pres = calls_of(&log, "0", Stage::Pre);
    assert_eq!(pres.len(), 3);
    for call in pres {
        assert_eq!(call.resolve_data, Some(json!({ "seed": 7 })));
    }
    assert_eq!(executor.resolve_data("0"), Some(&json!({ "seed": 7 })));

    // node_end is the very last call, after the final composition
    let last = log.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.stage, Stage::NodeEnd);
    assert_eq!(last.index, 2);
}

#[tokio::test]
async fn test_parent_results_flow_down_three_levels() {
    let (hook, log) = recording(chain_text);
    let mut executor = TreeExecutor::new(hook);
    let stats = executor
        .run(jobs(&[("0", 2), ("0.0", 2), ("0.0.0", 2)]))
        .await
        .unwrap();
    assert_eq!(stats.completed_compositions, 6);

    assert_eq!(generated_text(&executor, "0", 1), "0#1");
    assert_eq!(generated_text(&executor, "0.0", 0), "0#0/0.0#0");
    assert_eq!(generated_text(&executor, "0.0.0", 0), "0#0/0.0#0/0.0.0#0");
    assert_eq!(generated_text(&executor, "0.0.0", 1), "0#1/0.0#1/0.0.0#1");

    for call in calls_of(&log, "0", Stage::Generate) {
        assert_eq!(call.parent_result, None);
    }

    // the grandchild sees its direct parent's output, not the root's
    let pre = calls_of(&log, "0.0.0", Stage::Pre);
    assert_eq!(pre[1].parent_result, Some(json!({ "text": "0#1/0.0#1" })));
}

#[tokio::test]
async fn test_sibling_subtrees_are_isolated() {
    let (hook, log) = recording(chain_text);
    let mut executor = TreeExecutor::new(hook);
    executor
        .run(jobs(&[("0", 2), ("0.0", 2), ("1", 2), ("1.0", 2)]))
        .await
        .unwrap();

    assert_eq!(generated_text(&executor, "1.0", 0), "1#0/1.0#0");
    assert_eq!(generated_text(&executor, "1.0", 1), "1#1/1.0#1");

    // root 1 never sees anything produced under root 0
    for call in calls_of(&log, "1", Stage::Generate) {
        assert_eq!(call.parent_result, None);
    }
}

#[tokio::test]
async fn test_failure_blocks_descendants_only() {
    let (hook, log) = recording(|stage, ctx| {
        if stage == Stage::Resolve && ctx.block_path.to_string() == "0" {
            return HookResult::error("no_source", "source text missing");
        }
        HookResult::success()
    });
    let mut executor = TreeExecutor::new(hook);
    let stats = executor
        .run(jobs(&[("0", 2), ("0.0", 2), ("0.0.0", 2), ("1", 2)]))
        .await
        .unwrap();

    assert_eq!(executor.block_state("0"), Some(BlockState::Failed));
    assert_eq!(executor.block_state("0.0"), Some(BlockState::Blocked));
    assert_eq!(executor.block_state("0.0.0"), Some(BlockState::Blocked));
    assert_eq!(executor.block_state("1"), Some(BlockState::Complete));

    assert_eq!(stats.state, RunState::Complete);
    assert_eq!(stats.failed_blocks, 1);
    assert_eq!(stats.blocked, vec!["0.0".to_string(), "0.0.0".to_string()]);
    assert_eq!(stats.completed_compositions, 2);

    let failure = &stats.failures["0"];
    assert_eq!(failure.stage, Stage::Resolve);
    assert_eq!(failure.error.code, "no_source");
    assert_eq!(failure.error.message, "source text missing");
    assert_eq!(failure.completed, 0);

    // the failed block still gets node_end, its blocked children get nothing
    assert_eq!(calls_of(&log, "0", Stage::NodeEnd).len(), 1);
    assert!(calls_of(&log, "0", Stage::Pre).is_empty());
    assert!(log.lock().unwrap().iter().all(|c| !c.block.starts_with("0.")));
}

#[tokio::test]
async fn test_partial_completion_is_reported() {
    let (hook, log) = recording(|stage, ctx| {
        if stage == Stage::Generate && ctx.composition_index == 2 {
            return HookResult::error("generation_failed", "model refused");
        }
        HookResult::success()
    });
    let mut executor = TreeExecutor::new(hook);
    let stats = executor.run(jobs(&[("0", 5)])).await.unwrap();

    let failure = &stats.failures["0"];
    assert_eq!(failure.completed, 2);
    assert_eq!(failure.total, 5);
    assert_eq!(failure.stage, Stage::Generate);
    assert_eq!(executor.block_state("0"), Some(BlockState::Failed));

    // every root failed
    assert_eq!(stats.state, RunState::Error);
    assert_eq!(executor.state(), RunState::Error);

    assert!(calls_of(&log, "0", Stage::Pre).iter().all(|c| c.index <= 2));
    assert!(calls_of(&log, "0", Stage::Post).iter().all(|c| c.index < 2));
    assert_eq!(calls_of(&log, "0", Stage::NodeEnd).len(), 1);
}

#[tokio::test]
async fn test_started_descendant_is_closed_when_ancestor_fails() {
    let (hook, log) = recording(|stage, ctx| {
        if stage == Stage::Generate
            && ctx.block_path.to_string() == "0.0"
            && ctx.composition_index == 1
        {
            return HookResult::error("boom", "second variation failed");
        }
        HookResult::success()
    });
    let mut executor = TreeExecutor::new(hook);
    let stats = executor
        .run(jobs(&[("0", 2), ("0.0", 2), ("0.0.0", 2)]))
        .await
        .unwrap();

    assert_eq!(executor.block_state("0"), Some(BlockState::Complete));
    assert_eq!(executor.block_state("0.0"), Some(BlockState::Failed));
    assert_eq!(executor.block_state("0.0.0"), Some(BlockState::Blocked));
    assert_eq!(stats.state, RunState::Complete);

    assert_eq!(calls_of(&log, "0.0.0", Stage::NodeStart).len(), 1);
    assert_eq!(calls_of(&log, "0.0.0", Stage::NodeEnd).len(), 1);
    assert_eq!(calls_of(&log, "0.0.0", Stage::Generate).len(), 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let handle: Arc<OnceLock<StopHandle>> = Arc::new(OnceLock::new());
    let trigger = handle.clone();
    let (hook, log) = recording(move |stage, ctx| {
        if stage == Stage::Generate && ctx.composition_index == 2 {
            if let Some(stop) = trigger.get() {
                stop.stop();
            }
        }
        HookResult::success()
    });

    let (tx, mut rx) = progress_channel();
    let mut executor = TreeExecutor::new(hook).with_progress(tx);
    handle.set(executor.stop_handle()).unwrap();

    let stats = executor.run(jobs(&[("0", 6)])).await.unwrap();
    assert_eq!(stats.state, RunState::Paused);
    assert_eq!(stats.completed_compositions, 3);
    assert_eq!(executor.queue_position(), 3);
    assert_eq!(executor.block_state("0"), Some(BlockState::Running));
    assert!(calls_of(&log, "0", Stage::NodeEnd).is_empty());

    let mut paused = false;
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::RunPaused { queue_position, .. } = event {
            assert_eq!(queue_position, 3);
            paused = true;
        }
    }
    assert!(paused);

    let stats = executor.resume().await.unwrap();
    assert_eq!(stats.state, RunState::Complete);
    assert_eq!(stats.completed_compositions, 6);

    assert_eq!(calls_of(&log, "0", Stage::NodeStart).len(), 1);
    assert_eq!(calls_of(&log, "0", Stage::Resolve).len(), 1);
    assert_eq!(calls_of(&log, "0", Stage::NodeEnd).len(), 1);
    let indices: Vec<u64> = calls_of(&log, "0", Stage::Generate)
        .iter()
        .map(|c| c.index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_stop_on_last_entry_completes() {
    let handle: Arc<OnceLock<StopHandle>> = Arc::new(OnceLock::new());
    let trigger = handle.clone();
    let (hook, _log) = recording(move |stage, ctx| {
        if stage == Stage::Post && ctx.composition_index == 1 {
            if let Some(stop) = trigger.get() {
                stop.stop();
            }
        }
        HookResult::success()
    });

    let mut executor = TreeExecutor::new(hook);
    handle.set(executor.stop_handle()).unwrap();
    let stats = executor.run(jobs(&[("0", 2)])).await.unwrap();
    assert_eq!(stats.state, RunState::Complete);
}

#[tokio::test]
async fn test_resume_requires_pause() {
    let (hook, _log) = recording(|_, _| HookResult::success());
    let mut executor = TreeExecutor::new(hook);

    let err = executor.resume().await.unwrap_err();
    assert!(matches!(err, ExecutorError::NotPaused(RunState::Idle)));

    executor.run(jobs(&[("0", 1)])).await.unwrap();
    let err = executor.resume().await.unwrap_err();
    assert!(matches!(err, ExecutorError::NotPaused(RunState::Complete)));
}

#[tokio::test]
async fn test_event_sequence() {
    let (hook, _log) = recording(|_, _| HookResult::success());
    let (tx, mut rx) = progress_channel();
    let mut executor = TreeExecutor::new(hook).with_progress(tx);
    executor.run(jobs(&[("0", 1)])).await.unwrap();
    drop(executor);

    let mut names = Vec::new();
    while let Some(event) = rx.recv().await {
        names.push(match &event {
            ProgressEvent::Stage { stage, .. } => format!("stage:{}", stage),
            other => other.name().to_string(),
        });
    }
    assert_eq!(
        names,
        vec![
            "block_start",
            "stage:node_start",
            "stage:resolve",
            "stage:pre",
            "stage:generate",
            "stage:post",
            "composition_complete",
            "stage:node_end",
            "block_complete",
            "run_complete",
        ]
    );
}

#[tokio::test]
async fn test_blocked_events_name_the_culprit() {
    let (hook, _log) = recording(|stage, ctx| {
        if stage == Stage::NodeStart && ctx.is_root() {
            return HookResult::error("denied", "not allowed");
        }
        HookResult::success()
    });
    let (tx, mut rx) = progress_channel();
    let mut executor = TreeExecutor::new(hook).with_progress(tx);
    let stats = executor.run(jobs(&[("0", 1), ("0.0", 1)])).await.unwrap();
    assert_eq!(stats.state, RunState::Error);

    let mut blocked = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::BlockBlocked { block_path, blocked_by, .. } = event {
            blocked.push((block_path, blocked_by));
        }
    }
    assert_eq!(blocked, vec![("0.0".to_string(), "0".to_string())]);
}

#[tokio::test]
async fn test_structural_errors_reject_the_run() {
    let (hook, log) = recording(|_, _| HookResult::success());
    let mut executor = TreeExecutor::new(hook).with_config(ExecutorConfig {
        cardinality: Some(2),
    });

    let err = executor.run(jobs(&[("0", 3)])).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Structural(_)));
    assert_eq!(executor.state(), RunState::Error);
    assert!(log.lock().unwrap().is_empty());

    let err = executor.run(jobs(&[("0.0", 1)])).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Structural(_)));
}

#[tokio::test]
async fn test_rejected_run_drops_previous_run() {
    let (hook, _log) = recording(|_, _| HookResult::success());
    let mut executor = TreeExecutor::new(hook).with_config(ExecutorConfig {
        cardinality: Some(2),
    });

    let first = executor.run(jobs(&[("0", 2)])).await.unwrap();
    assert_eq!(first.total_compositions, 2);

    let err = executor
        .run(vec![ExecutionJob::new("0", 5)])
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Structural(_)));

    let stats = executor.stats();
    assert_eq!(stats.state, RunState::Error);
    assert_ne!(stats.run_id, first.run_id);
    assert_eq!(stats.total_compositions, 0);
    assert_eq!(stats.completed_compositions, 0);
    assert_eq!(stats.complete_blocks, 0);
    assert!(executor.queue().is_empty());
    assert_eq!(executor.block_state("0"), None);
    assert!(executor.variation_result("0", 0).is_none());
}

#[tokio::test]
async fn test_node_end_failure_keeps_blocked_state() {
    let (hook, log) = recording(|stage, ctx| {
        let path = ctx.block_path.to_string();
        match stage {
            Stage::Generate if path == "0.0" && ctx.composition_index == 1 => {
                HookResult::error("boom", "second variation failed")
            }
            Stage::NodeEnd if path == "0.0.0" => HookResult::error("cleanup", "could not close"),
            _ => HookResult::success(),
        }
    });
    let mut executor = TreeExecutor::new(hook);
    let stats = executor
        .run(jobs(&[("0", 2), ("0.0", 2), ("0.0.0", 2)]))
        .await
        .unwrap();

    assert_eq!(executor.block_state("0.0.0"), Some(BlockState::Blocked));
    assert_eq!(stats.failed_blocks, 1);
    assert!(!stats.failures.contains_key("0.0.0"));
    assert_eq!(stats.blocked, vec!["0.0.0".to_string()]);
    assert_eq!(calls_of(&log, "0.0.0", Stage::NodeEnd).len(), 1);
}

#[tokio::test]
async fn test_empty_job_list_completes() {
    let (hook, log) = recording(|_, _| HookResult::success());
    let mut executor = TreeExecutor::new(hook);
    let stats = executor.run(Vec::new()).await.unwrap();
    assert_eq!(stats.state, RunState::Complete);
    assert_eq!(stats.total_compositions, 0);
    assert!(log.lock().unwrap().is_empty());
}

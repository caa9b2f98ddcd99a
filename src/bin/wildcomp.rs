use clap::{Parser, Subcommand};
use wildcomp::compiler::core::Compiler;
use wildcomp::compiler::loader::load_manifest_from_yaml;
use wildcomp::hooks::builtin::TemplateHook;
use wildcomp::runtime::events::{ProgressEvent, progress_channel};
use wildcomp::runtime::executor::{ExecutorConfig, TreeExecutor};
use wildcomp::runtime::queue::ExecutionQueue;
use wildcomp::runtime::state::RunState;
use std::sync::Arc;
use std::path::PathBuf;
use anyhow::{Result, anyhow};
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a manifest and run every block through the hook lifecycle
    Run {
        /// Path to the manifest YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Compositions compiled per block (overrides the manifest)
        #[arg(long)]
        limit: Option<u64>,

        /// Pause after this many compositions, then resume
        #[arg(long)]
        stop_after: Option<usize>,

        /// Print progress events as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// Decompose a composition ID into per-dimension indices
    Index {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long)]
        id: u64,
    },

    /// Locate a bucket-composition ID using the manifest's bucket limits
    Bucket {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long)]
        id: u64,

        /// Offset inside the selected buckets
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Print the depth-first execution order
    Queue {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long)]
        limit: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, limit, stop_after, events } => {
            let manifest = load_manifest_from_yaml(&file)?;
            info!("Loaded manifest: {}", manifest.id);

            let jobs = Compiler::new().with_limit(limit).compile(&manifest)?;
            let cardinality = manifest.space().cardinality()?;

            let (tx, mut rx) = progress_channel();
            let mut executor = TreeExecutor::new(Arc::new(TemplateHook::new()))
                .with_config(ExecutorConfig { cardinality: Some(cardinality) })
                .with_progress(tx);
            let stop = executor.stop_handle();

            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let (Some(threshold), ProgressEvent::CompositionComplete { global_completed, .. }) =
                        (stop_after, &event)
                    {
                        if *global_completed == threshold {
                            stop.stop();
                        }
                    }
                    if events {
                        match serde_json::to_string(&event) {
                            Ok(line) => println!("{}", line),
                            Err(e) => tracing::error!("Failed to encode event: {}", e),
                        }
                    }
                }
            });

            let mut stats = executor.run(jobs).await?;
            while stats.state == RunState::Paused {
                info!(
                    "Paused at {}/{} compositions, resuming",
                    stats.completed_compositions, stats.total_compositions
                );
                stats = executor.resume().await?;
            }

            drop(executor);
            printer.await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Index { file, id } => {
            let manifest = load_manifest_from_yaml(&file)?;
            let space = manifest.space();
            let cardinality = space.cardinality()?;
            let indices = space.decompose(id)?;

            let mut sizes = serde_json::Map::new();
            sizes.insert("external_text".to_string(), json!(space.ext_count()));
            for name in space.wildcard_names() {
                sizes.insert(name.to_string(), json!(space.wildcard_count(name)));
            }

            let values: serde_json::Map<String, serde_json::Value> = indices
                .wildcards
                .iter()
                .map(|(name, &i)| {
                    let value = manifest.wildcards.get(name).and_then(|v| v.get(i)).cloned();
                    (name.clone(), json!(value))
                })
                .collect();

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "id": id % cardinality,
                    "cardinality": cardinality,
                    "sizes": sizes,
                    "indices": indices,
                    "ext_text": manifest.external_texts.get(indices.ext_index),
                    "values": values,
                }))?
            );
        }

        Commands::Bucket { file, id, offset } => {
            let manifest = load_manifest_from_yaml(&file)?;
            let bucketed = manifest
                .bucketed()?
                .ok_or_else(|| anyhow!("Manifest {} has no bucket limits", manifest.id))?;

            let located = bucketed.locate(id);
            let resolved = bucketed.resolve(id, offset);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "buckets": located,
                    "local_cardinality": bucketed.local_cardinality(id),
                    "indices": resolved,
                    "composition_id": bucketed.composition_id(id, offset),
                }))?
            );
        }

        Commands::Queue { file, limit } => {
            let manifest = load_manifest_from_yaml(&file)?;
            let jobs = Compiler::new().with_limit(limit).compile(&manifest)?;
            let queue = ExecutionQueue::build(&jobs, Some(manifest.space().cardinality()?))?;
            for (path, index) in queue.order() {
                println!("{}\t{}", path, index);
            }
        }
    }

    Ok(())
}

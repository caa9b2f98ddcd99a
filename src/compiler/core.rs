use std::collections::BTreeMap;
use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tracing::{info, warn};
use crate::compiler::loader::RunManifest;
use crate::compiler::template::{render, wildcard_refs};
use crate::runtime::job::ExecutionJob;

/// Upper bound on compositions per block when nothing else caps it.
pub const DEFAULT_COMPOSITION_LIMIT: u64 = 10_000;

/// Expands a manifest into one job per (block × composition), each carrying
/// the block's substituted text and its wildcard bindings.
pub struct Compiler {
    limit: Option<u64>,
}

impl Compiler {
    pub fn new() -> Self {
        Self { limit: None }
    }

    /// Overrides the manifest's `max_compositions`.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn compile(&self, manifest: &RunManifest) -> Result<Vec<ExecutionJob>> {
        let space = manifest.space();
        let cardinality = space
            .cardinality()
            .with_context(|| format!("Manifest {} has an unaddressable composition space", manifest.id))?;
        let limit = self
            .limit
            .or(manifest.max_compositions)
            .unwrap_or(DEFAULT_COMPOSITION_LIMIT);
        let count = cardinality.min(limit);
        if count < cardinality {
            warn!(
                manifest = %manifest.id,
                cardinality,
                count,
                "Composition space truncated"
            );
        }

        let tree = manifest.tree();
        let blocks = tree.walk();
        let mut jobs = Vec::new();

        for block in blocks {
            let refs = wildcard_refs(&block.content);
            if let Some(unknown) = refs.iter().find(|r| !manifest.wildcards.contains_key(*r)) {
                return Err(anyhow!(
                    "Block {} references unknown wildcard '{}'",
                    block.path,
                    unknown
                ));
            }

            for id in 0..count {
                let indices = space.decompose(id)?;
                let bindings: BTreeMap<String, String> = refs
                    .iter()
                    .map(|name| {
                        let index = indices.wildcards.get(name).copied().unwrap_or(0);
                        let value = manifest
                            .wildcards
                            .get(name)
                            .and_then(|values| values.get(index))
                            .cloned()
                            .unwrap_or_default();
                        (name.clone(), value)
                    })
                    .collect();
                let ext_text = manifest.external_texts.get(indices.ext_index).cloned();

                let job = ExecutionJob::new(block.path.to_string(), id)
                    .with_parent(block.parent_path.as_ref().map(|p| p.to_string()))
                    .with_prompt(json!({
                        "template": block.content,
                        "text": render(&block.content, &bindings),
                        "bindings": bindings,
                        "ext_index": indices.ext_index,
                        "ext_text": ext_text,
                    }));
                jobs.push(job);
            }
        }

        info!(manifest = %manifest.id, jobs = jobs.len(), cardinality, "Compiled job list");
        Ok(jobs)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

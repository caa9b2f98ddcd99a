use anyhow::{Result, Context as AnyhowContext};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::error::IndexError;
use crate::indexer::{BucketLimits, BucketedSpace, CompositionSpace};
use crate::tree::{BlockSpec, PromptTree};

/// 运行清单 (Run Manifest)
/// Everything needed to build the job list for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Values of the external-text dimension. Empty counts as one variant.
    #[serde(default)]
    pub external_texts: Vec<String>,
    #[serde(default)]
    pub wildcards: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    /// Caps how many compositions are compiled per block.
    #[serde(default)]
    pub max_compositions: Option<u64>,
    #[serde(default)]
    pub buckets: Option<BucketLimits>,
}

impl RunManifest {
    pub fn space(&self) -> CompositionSpace {
        CompositionSpace::new(
            self.external_texts.len(),
            self.wildcards.iter().map(|(name, values)| (name.clone(), values.len())),
        )
    }

    /// `None` when the manifest sets no bucket limits.
    pub fn bucketed(&self) -> Result<Option<BucketedSpace>, IndexError> {
        self.buckets
            .clone()
            .map(|limits| BucketedSpace::new(self.space(), limits))
            .transpose()
    }

    pub fn tree(&self) -> PromptTree {
        PromptTree::from_specs(&self.blocks)
    }
}

pub fn load_manifest_from_yaml(file_path: impl AsRef<Path>) -> Result<RunManifest> {
    let file_path = file_path.as_ref();
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path.display()))?;

    let manifest: RunManifest = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path.display()))?;

    Ok(manifest)
}

pub mod path;

pub use path::BlockPath;

use serde::{Serialize, Deserialize};

/// Authored form of a block, as it appears in a manifest. Paths are assigned
/// from sibling position when the tree is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<BlockSpec>,
}

impl BlockSpec {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: BlockSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub path: BlockPath,
    pub parent_path: Option<BlockPath>,
    pub content: String,
    pub children: Vec<Block>,
}

impl Block {
    fn from_spec(spec: &BlockSpec, path: BlockPath) -> Self {
        let children = spec
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| Block::from_spec(child, path.child(i as u32)))
            .collect();
        Block {
            parent_path: path.parent(),
            path,
            content: spec.content.clone(),
            children,
        }
    }
}

/// 提示词树 (read-only block hierarchy)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptTree {
    roots: Vec<Block>,
}

impl PromptTree {
    pub fn from_specs(specs: &[BlockSpec]) -> Self {
        Self {
            roots: specs
                .iter()
                .enumerate()
                .map(|(i, spec)| Block::from_spec(spec, BlockPath::root(i as u32)))
                .collect(),
        }
    }

    pub fn roots(&self) -> &[Block] {
        &self.roots
    }

    /// All blocks, depth-first pre-order.
    pub fn walk(&self) -> Vec<&Block> {
        fn visit<'a>(block: &'a Block, out: &mut Vec<&'a Block>) {
            out.push(block);
            for child in &block.children {
                visit(child, out);
            }
        }

        let mut out = Vec::new();
        for root in &self.roots {
            visit(root, &mut out);
        }
        out
    }
}

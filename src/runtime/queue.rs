use std::collections::{HashMap, HashSet};
use crate::error::StructuralError;
use crate::runtime::job::ExecutionJob;
use crate::tree::BlockPath;

/// Index into [`ExecutionQueue::blocks`].
pub type BlockId = usize;

/// Arena record for one block that has at least one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub path: BlockPath,
    pub parent: Option<BlockId>,
    /// Sorted by path.
    pub children: Vec<BlockId>,
    /// Composition indices in input order.
    pub compositions: Vec<u64>,
    /// Queue position of the block's final entry.
    pub last_position: usize,
    jobs: HashMap<u64, usize>,
}

impl BlockNode {
    pub fn total(&self) -> usize {
        self.compositions.len()
    }

    /// Input-list index of the job for one composition.
    pub fn job_for(&self, composition_index: u64) -> Option<usize> {
        self.jobs.get(&composition_index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub block: BlockId,
    pub composition_index: u64,
    /// Index of the originating job in the input list.
    pub job: usize,
}

/// Depth-first execution order over a flat job list. For every composition
/// `i` of a block, the block's entry for `i` is followed by the entries of
/// its whole subtree for `i` before the block's next composition.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQueue {
    entries: Vec<QueueEntry>,
    blocks: Vec<BlockNode>,
    lookup: HashMap<BlockPath, BlockId>,
    roots: Vec<BlockId>,
}

impl ExecutionQueue {
    /// Validates `jobs` and lays them out in depth-first order. When
    /// `cardinality` is given, every composition index must be below it.
    pub fn build(jobs: &[ExecutionJob], cardinality: Option<u64>) -> Result<Self, StructuralError> {
        let mut queue = ExecutionQueue::default();

        // 1. Parse, validate and group by block
        for (job_idx, job) in jobs.iter().enumerate() {
            let path: BlockPath = job.block_path.parse()?;
            let expected = path.parent();
            let declared = job
                .parent_path
                .as_deref()
                .map(str::parse::<BlockPath>)
                .transpose()?;
            if declared != expected {
                return Err(StructuralError::ParentMismatch {
                    path: path.to_string(),
                    declared: declared.map(|p| p.to_string()).unwrap_or_else(|| "<none>".to_string()),
                    expected: expected.map(|p| p.to_string()).unwrap_or_else(|| "<none>".to_string()),
                });
            }

            if let Some(limit) = cardinality {
                if job.composition_index >= limit {
                    return Err(StructuralError::CompositionOutOfRange {
                        path: path.to_string(),
                        index: job.composition_index,
                        cardinality: limit,
                    });
                }
            }

            let id = queue.intern(path);
            let node = &mut queue.blocks[id];
            if node.jobs.insert(job.composition_index, job_idx).is_some() {
                return Err(StructuralError::DuplicateJob {
                    path: node.path.to_string(),
                    index: job.composition_index,
                });
            }
            node.compositions.push(job.composition_index);
        }

        // 2. Link parents
        for id in 0..queue.blocks.len() {
            let Some(parent_path) = queue.blocks[id].path.parent() else {
                queue.roots.push(id);
                continue;
            };
            let parent = *queue.lookup.get(&parent_path).ok_or_else(|| {
                StructuralError::MissingParent {
                    path: queue.blocks[id].path.to_string(),
                    parent: parent_path.to_string(),
                }
            })?;
            queue.blocks[id].parent = Some(parent);
            queue.blocks[parent].children.push(id);
        }

        let blocks = &queue.blocks;
        queue.roots.sort_by(|a, b| blocks[*a].path.cmp(&blocks[*b].path));
        let order: Vec<Vec<BlockId>> = blocks
            .iter()
            .map(|node| {
                let mut children = node.children.clone();
                children.sort_by(|a, b| blocks[*a].path.cmp(&blocks[*b].path));
                children
            })
            .collect();
        for (node, children) in queue.blocks.iter_mut().zip(order) {
            node.children = children;
        }

        // 3. Emit
        let mut entries = Vec::with_capacity(jobs.len());
        for &root in &queue.roots {
            for index in queue.subtree_indices(root) {
                queue.emit(root, index, &mut entries);
            }
        }
        for (position, entry) in entries.iter().enumerate() {
            queue.blocks[entry.block].last_position = position;
        }
        queue.entries = entries;

        Ok(queue)
    }

    fn intern(&mut self, path: BlockPath) -> BlockId {
        if let Some(&id) = self.lookup.get(&path) {
            return id;
        }
        let id = self.blocks.len();
        self.lookup.insert(path.clone(), id);
        self.blocks.push(BlockNode {
            path,
            parent: None,
            children: Vec::new(),
            compositions: Vec::new(),
            last_position: 0,
            jobs: HashMap::new(),
        });
        id
    }

    /// The block's own indices, then any extra indices found deeper in its
    /// subtree, each in first-appearance order.
    fn subtree_indices(&self, root: BlockId) -> Vec<u64> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in std::iter::once(root).chain(self.descendants(root)) {
            for &index in &self.blocks[id].compositions {
                if seen.insert(index) {
                    out.push(index);
                }
            }
        }
        out
    }

    fn emit(&self, id: BlockId, index: u64, out: &mut Vec<QueueEntry>) {
        let node = &self.blocks[id];
        if let Some(&job) = node.jobs.get(&index) {
            out.push(QueueEntry {
                block: id,
                composition_index: index,
                job,
            });
        }
        for &child in &node.children {
            self.emit(child, index, out);
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn blocks(&self) -> &[BlockNode] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BlockNode {
        &self.blocks[id]
    }

    pub fn block_id(&self, path: &BlockPath) -> Option<BlockId> {
        self.lookup.get(path).copied()
    }

    pub fn roots(&self) -> &[BlockId] {
        &self.roots
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(self.blocks[id].parent, move |&p| self.blocks[p].parent)
    }

    /// Strict descendants, depth-first pre-order.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack: Vec<BlockId> = self.blocks[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.blocks[next].children.iter().rev());
        }
        out
    }

    /// `(block path, composition index)` pairs in execution order.
    pub fn order(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .map(|e| (self.blocks[e.block].path.to_string(), e.composition_index))
            .collect()
    }
}

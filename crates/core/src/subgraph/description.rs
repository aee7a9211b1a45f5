use serde::{Deserialize, Serialize};

use crate::model::{BasicBlockId, BasicBlockType, BlockAttributes, BlockType, SectionId, Size};
use crate::subgraph::BasicBlockSubGraph;

/// Rounding rules used when estimating the size of a described block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizePolicy {
    /// Worst-case encoding of one successor edge (x86 `jcc rel32` is 6 bytes).
    pub max_successor_size: Size,
    /// Data basic blocks start on a multiple of this, relative to the block start.
    pub data_alignment: Size,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self { max_successor_size: 6, data_alignment: 4 }
    }
}

/// One block to be materialized from an ordered run of basic blocks.
///
/// A basic block may appear in at most one description at a time; the
/// validator enforces this across the whole description list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescription {
    pub name: String,
    pub block_type: BlockType,
    pub section: SectionId,
    pub alignment: Size,
    pub attributes: BlockAttributes,
    /// Emission order.
    pub basic_block_order: Vec<BasicBlockId>,
}

impl BlockDescription {
    /// Alignment value meaning "no particular alignment".
    pub const NO_ALIGNMENT: Size = 0;

    pub(crate) fn new(
        name: impl Into<String>,
        block_type: BlockType,
        section: SectionId,
        alignment: Size,
        attributes: BlockAttributes,
    ) -> Self {
        Self {
            name: name.into(),
            block_type,
            section,
            alignment,
            attributes,
            basic_block_order: Vec::new(),
        }
    }

    /// True for `NO_ALIGNMENT` and for any power of two.
    pub fn is_valid_alignment(alignment: Size) -> bool {
        alignment == Self::NO_ALIGNMENT || alignment.is_power_of_two()
    }

    pub fn effective_alignment(&self) -> Size {
        self.alignment.max(1)
    }

    pub fn push(&mut self, id: BasicBlockId) {
        self.basic_block_order.push(id);
    }

    /// Insert at `index`, clamped to the end of the ordering.
    pub fn insert(&mut self, index: usize, id: BasicBlockId) {
        let index = index.min(self.basic_block_order.len());
        self.basic_block_order.insert(index, id);
    }

    /// Remove every occurrence of `id`; returns whether anything was removed.
    pub fn remove(&mut self, id: BasicBlockId) -> bool {
        let before = self.basic_block_order.len();
        self.basic_block_order.retain(|bb| *bb != id);
        before != self.basic_block_order.len()
    }

    pub fn contains(&self, id: BasicBlockId) -> bool {
        self.basic_block_order.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.basic_block_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basic_block_order.is_empty()
    }

    /// Upper bound on the size of this block under the default `SizePolicy`.
    pub fn max_size(&self, subgraph: &BasicBlockSubGraph<'_>) -> usize {
        self.max_size_with(subgraph, &SizePolicy::default())
    }

    /// Upper bound on the size of this block, not counting trailing padding.
    ///
    /// Data basic blocks are aligned relative to the start of the block;
    /// code basic blocks reserve `max_successor_size` per successor edge.
    pub fn max_size_with(&self, subgraph: &BasicBlockSubGraph<'_>, policy: &SizePolicy) -> usize {
        let data_alignment = policy.data_alignment.max(1) as usize;
        let mut size = 0usize;
        for id in &self.basic_block_order {
            let Some(bb) = subgraph.basic_block(*id) else { continue };
            match bb.kind() {
                BasicBlockType::Code => {
                    size += bb.data().len();
                    size += bb.successors().len() * policy.max_successor_size as usize;
                }
                BasicBlockType::Data => {
                    size = size.div_ceil(data_alignment) * data_alignment;
                    size += bb.data().len();
                }
                BasicBlockType::Padding => size += bb.data().len(),
            }
        }
        size
    }
}

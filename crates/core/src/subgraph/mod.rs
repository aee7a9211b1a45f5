//! Basic-block sub-graph: the factory, owner and bookkeeper of the basic
//! blocks carved out of (or synthesized for) one original block.
//!
//! The sub-graph owns every basic block in an id-keyed arena. The original
//! address space and the block descriptions refer to basic blocks by
//! `BasicBlockId` only, so nothing can hold a basic block past the lifetime of
//! the sub-graph that created it.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::model::{
    BasicBlock, BasicBlockId, BasicBlockType, Block, BlockAttributes, BlockType, Offset,
    SectionId, Size,
};

pub mod address_space;
pub mod description;
pub mod validate;

pub use address_space::{AddressSpace, SourceRange};
pub use description::{BlockDescription, SizePolicy};
pub use validate::{ValidationCheck, ValidationReport, Violation};

/// Construction errors reported by the sub-graph factories.
///
/// A failed factory call never changes the sub-graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubGraphError {
    #[error("generated basic block '{name}' must have size 0, got {size}")]
    GeneratedWithSize { name: String, size: Size },

    #[error("basic block '{name}' has invalid origin offset {offset}")]
    InvalidOffset { name: String, offset: Offset },

    #[error("basic block '{name}' at offset {offset} has an empty source range")]
    EmptyRange { name: String, offset: Offset },

    #[error("padding basic block '{name}' cannot originate at offset {offset}")]
    PaddingWithOrigin { name: String, offset: Offset },

    #[error("basic block '{name}' carries {actual} bytes but its source range is {expected} bytes")]
    PayloadSizeMismatch { name: String, expected: Size, actual: usize },

    #[error("basic block '{name}' range {range} lies outside the {block_size}-byte original block")]
    OutsideOriginalBlock { name: String, range: SourceRange, block_size: usize },

    #[error("basic block '{name}' range {range} overlaps {existing}")]
    OverlappingRange { name: String, range: SourceRange, existing: BasicBlockId },

    #[error("alignment {0} is neither a power of two nor the no-alignment sentinel")]
    InvalidAlignment(Size),

    #[error("basic block id space exhausted")]
    IdsExhausted,
}

/// Layout of one or more blocks as code, data and padding basic blocks.
#[derive(Debug, Default)]
pub struct BasicBlockSubGraph<'a> {
    original_block: Option<&'a Block>,
    basic_blocks: BTreeMap<BasicBlockId, BasicBlock>,
    original_address_space: AddressSpace<BasicBlockId>,
    block_descriptions: Vec<BlockDescription>,
    // Next id to hand out; past `u32::MAX` once ids are exhausted.
    next_basic_block_id: u64,
}

impl<'a> BasicBlockSubGraph<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sub-graph derived from `block`.
    pub fn for_block(block: &'a Block) -> Self {
        Self { original_block: Some(block), ..Self::default() }
    }

    pub fn original_block(&self) -> Option<&'a Block> {
        self.original_block
    }

    pub fn set_original_block(&mut self, block: Option<&'a Block>) {
        self.original_block = block;
    }

    pub fn basic_block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.basic_blocks.get(&id)
    }

    pub fn basic_block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.basic_blocks.get_mut(&id)
    }

    /// All basic blocks in ascending id (creation) order.
    pub fn basic_blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.basic_blocks.values()
    }

    pub fn basic_block_count(&self) -> usize {
        self.basic_blocks.len()
    }

    pub fn contains_basic_block(&self, id: BasicBlockId) -> bool {
        self.basic_blocks.contains_key(&id)
    }

    pub fn original_address_space(&self) -> &AddressSpace<BasicBlockId> {
        &self.original_address_space
    }

    pub fn block_descriptions(&self) -> &[BlockDescription] {
        &self.block_descriptions
    }

    /// Descriptions can be edited and reordered in place, but never removed.
    pub fn block_descriptions_mut(&mut self) -> &mut [BlockDescription] {
        &mut self.block_descriptions
    }

    /// Create a basic block owned by this sub-graph.
    ///
    /// `offset`/`size` give the range `[offset, offset + size)` the basic block
    /// occupied in the original block; pass `BasicBlock::NO_OFFSET` and 0 for a
    /// generated basic block. Originated basic blocks are entered into the
    /// original address space and their payload must cover the whole range.
    pub fn add_basic_block(
        &mut self,
        name: &str,
        kind: BasicBlockType,
        offset: Offset,
        size: Size,
        data: &[u8],
    ) -> Result<BasicBlockId, SubGraphError> {
        let range = self.check_origin(name, kind, offset, size, data).map_err(|err| {
            debug!(basic_block = name, error = %err, "rejected basic block");
            err
        })?;

        let id = u32::try_from(self.next_basic_block_id)
            .map(BasicBlockId)
            .map_err(|_| SubGraphError::IdsExhausted)?;

        if let Some(range) = range {
            if !self.original_address_space.insert(range, id) {
                // check_origin already ruled out overlap; an empty range cannot get here.
                return Err(SubGraphError::EmptyRange { name: name.to_string(), offset });
            }
        }
        self.next_basic_block_id += 1;
        self.basic_blocks.insert(id, BasicBlock::new(id, name, kind, offset, size, data.to_vec()));
        debug!(basic_block = name, %id, offset, size, "added basic block");
        Ok(id)
    }

    fn check_origin(
        &self,
        name: &str,
        kind: BasicBlockType,
        offset: Offset,
        size: Size,
        data: &[u8],
    ) -> Result<Option<SourceRange>, SubGraphError> {
        if offset == BasicBlock::NO_OFFSET {
            if size != 0 {
                return Err(SubGraphError::GeneratedWithSize { name: name.to_string(), size });
            }
            return Ok(None);
        }
        if offset < 0 {
            return Err(SubGraphError::InvalidOffset { name: name.to_string(), offset });
        }
        if size == 0 {
            return Err(SubGraphError::EmptyRange { name: name.to_string(), offset });
        }
        if kind == BasicBlockType::Padding {
            return Err(SubGraphError::PaddingWithOrigin { name: name.to_string(), offset });
        }
        if data.len() != size as usize {
            return Err(SubGraphError::PayloadSizeMismatch {
                name: name.to_string(),
                expected: size,
                actual: data.len(),
            });
        }

        let range = SourceRange::new(offset, size);
        if let Some(block) = self.original_block {
            if range.end() > block.size() as i64 {
                return Err(SubGraphError::OutsideOriginalBlock {
                    name: name.to_string(),
                    range,
                    block_size: block.size(),
                });
            }
        }
        if let Some((_, existing)) = self.original_address_space.find_intersecting(&range) {
            return Err(SubGraphError::OverlappingRange {
                name: name.to_string(),
                range,
                existing: *existing,
            });
        }
        Ok(Some(range))
    }

    /// Append a new, empty block description.
    pub fn add_block_description(
        &mut self,
        name: &str,
        block_type: BlockType,
        section: SectionId,
        alignment: Size,
        attributes: BlockAttributes,
    ) -> Result<&mut BlockDescription, SubGraphError> {
        if !BlockDescription::is_valid_alignment(alignment) {
            debug!(description = name, alignment, "rejected block description");
            return Err(SubGraphError::InvalidAlignment(alignment));
        }
        let index = self.block_descriptions.len();
        self.block_descriptions.push(BlockDescription::new(
            name, block_type, section, alignment, attributes,
        ));
        Ok(&mut self.block_descriptions[index])
    }

    /// The basic block whose original range covers `offset`.
    ///
    /// Always `None` for a sub-graph that is not derived from an original block.
    pub fn find_basic_block(&self, offset: Offset) -> Option<&BasicBlock> {
        self.find_basic_block_id(offset).and_then(|id| self.basic_blocks.get(&id))
    }

    pub fn find_basic_block_id(&self, offset: Offset) -> Option<BasicBlockId> {
        self.original_block?;
        self.original_address_space.find_containing(offset).map(|(_, id)| *id)
    }

    /// Ids of every basic block placed in some description, first placement wins.
    pub(crate) fn placements(&self) -> BTreeMap<BasicBlockId, usize> {
        let mut placed = BTreeMap::new();
        for (index, description) in self.block_descriptions.iter().enumerate() {
            for id in &description.basic_block_order {
                placed.entry(*id).or_insert(index);
            }
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_id_is_assigned_before_exhaustion() {
        let mut subgraph =
            BasicBlockSubGraph { next_basic_block_id: u64::from(u32::MAX), ..Default::default() };
        let last = subgraph
            .add_basic_block("last", BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[])
            .expect("u32::MAX is a valid id");
        assert_eq!(last, BasicBlockId(u32::MAX));

        let err = subgraph
            .add_basic_block("one_more", BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[])
            .unwrap_err();
        assert_eq!(err, SubGraphError::IdsExhausted);
        assert_eq!(subgraph.basic_block_count(), 1);
    }
}

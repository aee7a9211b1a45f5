//! Core data model for block rewriting.
//!
//! This module holds the entities a basic-block sub-graph talks about:
//! - `Block`: the original, externally owned block a sub-graph derives from.
//! - `Referrer`: an inbound reference into a block.
//! - `BasicBlock` and its successor edges (see `basic_block`).
//! - Small value types shared by the rest of the crate (ids, block types,
//!   attribute flags).

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod basic_block;

pub use basic_block::{
    BasicBlock, BasicBlockError, BasicBlockId, BasicBlockType, BranchCondition, ExternalTarget,
    Successor, SuccessorTarget,
};

/// Offset inside a block, in bytes.
pub type Offset = i32;
/// Size of a block or range, in bytes.
pub type Size = u32;
/// Identifier of the section a block lives in.
pub type SectionId = u32;

/// Identity of a block in the surrounding block graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// Kind of a whole block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    #[default]
    Code,
    Data,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Code => "code",
            BlockType::Data => "data",
        }
    }
}

/// Attribute flags attached to a block.
///
/// Stored as raw bits so the value can be carried through serialized plans
/// and summaries unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockAttributes(u32);

impl BlockAttributes {
    pub const NON_RETURN_FUNCTION: Self = Self(1 << 0);
    pub const PADDING_BLOCK: Self = Self(1 << 1);
    pub const HAS_INLINE_ASSEMBLY: Self = Self(1 << 2);
    pub const BUILT_BY_UNSUPPORTED_COMPILER: Self = Self(1 << 3);
    pub const ERRORED_DISASSEMBLY: Self = Self(1 << 4);
    pub const HAS_EXCEPTION_HANDLING: Self = Self(1 << 5);
    pub const DISASSEMBLED_PAST_END: Self = Self(1 << 6);
    pub const UNSUPPORTED_INSTRUCTIONS: Self = Self(1 << 7);

    const NAMED: [(&'static str, Self); 8] = [
        ("non_return_function", Self::NON_RETURN_FUNCTION),
        ("padding_block", Self::PADDING_BLOCK),
        ("has_inline_assembly", Self::HAS_INLINE_ASSEMBLY),
        ("built_by_unsupported_compiler", Self::BUILT_BY_UNSUPPORTED_COMPILER),
        ("errored_disassembly", Self::ERRORED_DISASSEMBLY),
        ("has_exception_handling", Self::HAS_EXCEPTION_HANDLING),
        ("disassembled_past_end", Self::DISASSEMBLED_PAST_END),
        ("unsupported_instructions", Self::UNSUPPORTED_INSTRUCTIONS),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Look up a single flag by its snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.iter().find(|(n, _)| *n == name).map(|(_, flag)| *flag)
    }

    /// Names of the flags that are set, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED.iter().filter(|(_, flag)| self.contains(*flag)).map(|(n, _)| *n).collect()
    }
}

/// An inbound reference into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Referrer {
    /// Block holding the reference.
    pub source: BlockId,
    /// Where the reference lives inside `source`.
    pub source_offset: Offset,
    /// Offset the reference points at inside the referenced block.
    pub target_offset: Offset,
}

impl Referrer {
    pub fn new(source: BlockId, source_offset: Offset, target_offset: Offset) -> Self {
        Self { source, source_offset, target_offset }
    }
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{} -> +{}", self.source, self.source_offset, self.target_offset)
    }
}

/// A block of the original image that a sub-graph may be derived from.
///
/// Sub-graphs only ever borrow a `Block`; its owner is whoever loaded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub block_type: BlockType,
    pub section: SectionId,
    pub alignment: Size,
    pub attributes: BlockAttributes,
    pub data: Vec<u8>,
    pub referrers: Vec<Referrer>,
}

impl Block {
    pub fn new(id: BlockId, name: impl Into<String>, block_type: BlockType, data: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            block_type,
            section: 0,
            alignment: 1,
            attributes: BlockAttributes::empty(),
            data,
            referrers: Vec::new(),
        }
    }

    /// Builder-style helper to attach an inbound referrer.
    pub fn with_referrer(mut self, referrer: Referrer) -> Self {
        self.referrers.push(referrer);
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn set_attribute(&mut self, attribute: BlockAttributes) {
        self.attributes.insert(attribute);
    }

    /// Referrers that originate outside this block.
    ///
    /// Self references are internal control flow and are rebuilt from the
    /// basic-block successors, so they never count as entry points.
    pub fn external_referrers(&self) -> impl Iterator<Item = &Referrer> + '_ {
        self.referrers.iter().filter(move |r| r.source != self.id)
    }
}

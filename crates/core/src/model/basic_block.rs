use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BlockId, Offset, Referrer, Size};
use crate::subgraph::SourceRange;

/// Identity of a basic block, unique within its sub-graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasicBlockId(pub u32);

impl fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb#{}", self.0)
    }
}

/// Disposition of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicBlockType {
    Code,
    Data,
    Padding,
}

impl BasicBlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicBlockType::Code => "code",
            BasicBlockType::Data => "data",
            BasicBlockType::Padding => "padding",
        }
    }
}

/// Condition under which a successor edge is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCondition {
    #[default]
    Always,
    Equal,
    NotEqual,
    Above,
    BelowOrEqual,
    Below,
    AboveOrEqual,
    Greater,
    LessOrEqual,
    Less,
    GreaterOrEqual,
    Overflow,
    NoOverflow,
    Sign,
    NoSign,
    Parity,
    NoParity,
}

impl BranchCondition {
    /// The condition under which the other arm of a two-way branch is taken.
    ///
    /// `Always` has no inverse.
    pub fn inverse(self) -> Option<Self> {
        use BranchCondition::*;
        let inverse = match self {
            Always => return None,
            Equal => NotEqual,
            NotEqual => Equal,
            Above => BelowOrEqual,
            BelowOrEqual => Above,
            Below => AboveOrEqual,
            AboveOrEqual => Below,
            Greater => LessOrEqual,
            LessOrEqual => Greater,
            Less => GreaterOrEqual,
            GreaterOrEqual => Less,
            Overflow => NoOverflow,
            NoOverflow => Overflow,
            Sign => NoSign,
            NoSign => Sign,
            Parity => NoParity,
            NoParity => Parity,
        };
        Some(inverse)
    }
}

/// A location outside the sub-graph: some offset in an already materialized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalTarget {
    pub block: BlockId,
    pub offset: Offset,
}

/// Where a successor edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessorTarget {
    /// Another basic block of the same sub-graph.
    Internal(BasicBlockId),
    /// A location the sub-graph does not own.
    External(ExternalTarget),
}

impl fmt::Display for SuccessorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessorTarget::Internal(id) => write!(f, "{id}"),
            SuccessorTarget::External(ext) => write!(f, "{}+{}", ext.block, ext.offset),
        }
    }
}

/// Control-flow continuation at the end of a code basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Successor {
    pub condition: BranchCondition,
    pub target: SuccessorTarget,
}

impl Successor {
    pub fn internal(condition: BranchCondition, target: BasicBlockId) -> Self {
        Self { condition, target: SuccessorTarget::Internal(target) }
    }

    pub fn external(condition: BranchCondition, block: BlockId, offset: Offset) -> Self {
        Self { condition, target: SuccessorTarget::External(ExternalTarget { block, offset }) }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BasicBlockError {
    #[error("basic block {0} is not a code basic block and cannot have successors")]
    NotCode(BasicBlockId),
}

/// A run of code, data or padding owned by a sub-graph.
///
/// Identity and origin are fixed at creation; only the payload, successors
/// and attached referrers can change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: BasicBlockId,
    name: String,
    kind: BasicBlockType,
    offset: Offset,
    size: Size,
    data: Vec<u8>,
    successors: Vec<Successor>,
    referrers: BTreeSet<Referrer>,
}

impl BasicBlock {
    /// Offset of a basic block that was synthesized rather than carved out of
    /// the original block.
    pub const NO_OFFSET: Offset = -1;

    pub(crate) fn new(
        id: BasicBlockId,
        name: impl Into<String>,
        kind: BasicBlockType,
        offset: Offset,
        size: Size,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            offset,
            size,
            data,
            successors: Vec::new(),
            referrers: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> BasicBlockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BasicBlockType {
        self.kind
    }

    pub fn is_code(&self) -> bool {
        self.kind == BasicBlockType::Code
    }

    /// Offset in the original block, or `NO_OFFSET` when generated.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Bytes this basic block occupied in the original block (0 when generated).
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_generated(&self) -> bool {
        self.offset == Self::NO_OFFSET
    }

    pub fn source_range(&self) -> Option<SourceRange> {
        if self.is_generated() {
            None
        } else {
            Some(SourceRange::new(self.offset, self.size))
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn successors(&self) -> &[Successor] {
        &self.successors
    }

    /// Raw access for passes that rewrite edges; the validator re-checks the result.
    pub fn successors_mut(&mut self) -> &mut Vec<Successor> {
        &mut self.successors
    }

    pub fn add_successor(&mut self, successor: Successor) -> Result<(), BasicBlockError> {
        if !self.is_code() {
            return Err(BasicBlockError::NotCode(self.id));
        }
        self.successors.push(successor);
        Ok(())
    }

    pub fn referrers(&self) -> &BTreeSet<Referrer> {
        &self.referrers
    }

    /// Attach an inbound referrer; returns false if it was already attached.
    pub fn add_referrer(&mut self, referrer: Referrer) -> bool {
        self.referrers.insert(referrer)
    }

    pub fn remove_referrer(&mut self, referrer: &Referrer) -> bool {
        self.referrers.remove(referrer)
    }
}

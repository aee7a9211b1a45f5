//! Layout plans: a serialized description of an original block, the basic
//! blocks carved from it and the block descriptions they should form.
//!
//! Plans stand in for a real decomposer. They are loaded from YAML or JSON
//! (chosen by file extension) and replayed into a `BasicBlockSubGraph`
//! through the regular factories, so every factory invariant still applies.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    BasicBlock, BasicBlockError, BasicBlockId, BasicBlockType, Block, BlockAttributes, BlockId,
    BlockType, BranchCondition, ExternalTarget, Offset, Referrer, SectionId, Size, Successor,
};
use crate::services::transform::{DecomposeError, Decomposer};
use crate::subgraph::{BasicBlockSubGraph, SourceRange, SubGraphError};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("basic block name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("unknown basic block '{name}' referenced from {context}")]
    UnknownBasicBlock { name: String, context: String },

    #[error("invalid hex payload for '{name}': {source}")]
    InvalidHex {
        name: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("original block digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("unknown block attribute '{0}'")]
    UnknownAttribute(String),

    #[error("successor #{index} of '{name}' must name exactly one of target, target_id or external")]
    AmbiguousSuccessor { name: String, index: usize },

    #[error("basic block '{0}' has an origin but neither a payload nor a size to slice one")]
    MissingPayload(String),

    #[error(transparent)]
    SubGraph(#[from] SubGraphError),

    #[error(transparent)]
    BasicBlock(#[from] BasicBlockError),
}

fn default_alignment() -> Size {
    1
}

/// The block a plan decomposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalBlockSpec {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub section: SectionId,
    #[serde(default = "default_alignment")]
    pub alignment: Size,
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Hex-encoded bytes; whitespace is ignored.
    pub data: String,
    /// Optional SHA-256 of the decoded bytes, checked on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub referrers: Vec<Referrer>,
}

/// One successor edge of a planned code basic block.
///
/// Exactly one of `target`, `target_id` or `external` must be given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessorSpec {
    #[serde(default)]
    pub condition: BranchCondition,
    /// Name of another planned basic block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Raw basic-block id, which need not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlockSpec {
    pub name: String,
    pub kind: BasicBlockType,
    /// Offset in the original block; omitted for generated basic blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    /// Hex-encoded payload. Originated basic blocks default to their slice of
    /// the original block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub successors: Vec<SuccessorSpec>,
    #[serde(default)]
    pub referrers: Vec<Referrer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionSpec {
    pub name: String,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub section: SectionId,
    #[serde(default)]
    pub alignment: Size,
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Basic-block names in emission order.
    #[serde(default)]
    pub basic_blocks: Vec<String>,
}

/// A complete layout plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_block: Option<OriginalBlockSpec>,
    #[serde(default)]
    pub basic_blocks: Vec<BasicBlockSpec>,
    #[serde(default)]
    pub descriptions: Vec<DescriptionSpec>,
}

/// Hex SHA-256 of `bytes`.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn decode_hex(name: &str, text: &str) -> Result<Vec<u8>, PlanError> {
    let compact: String = text.split_whitespace().collect();
    hex::decode(compact).map_err(|source| PlanError::InvalidHex { name: name.to_string(), source })
}

fn parse_attributes(names: &[String]) -> Result<BlockAttributes, PlanError> {
    let mut attributes = BlockAttributes::empty();
    for name in names {
        let flag = BlockAttributes::from_name(name)
            .ok_or_else(|| PlanError::UnknownAttribute(name.clone()))?;
        attributes.insert(flag);
    }
    Ok(attributes)
}

/// Parse a plan from bytes, as JSON or YAML.
pub fn parse_plan(bytes: &[u8], json: bool) -> Result<LayoutPlan> {
    let plan = if json {
        serde_json::from_slice(bytes).context("Failed to parse layout plan JSON")?
    } else {
        serde_yaml::from_slice(bytes).context("Failed to parse layout plan YAML")?
    };
    Ok(plan)
}

/// Load a plan from disk and return it with the SHA-256 of the file contents.
pub fn read_plan(path: &Path) -> Result<(LayoutPlan, String)> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read layout plan at {}", path.display()))?;
    let json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let plan = parse_plan(&bytes, json)
        .with_context(|| format!("Invalid layout plan {}", path.display()))?;
    Ok((plan, sha256_bytes(&bytes)))
}

/// Load a plan from disk (YAML unless the extension is `.json`).
pub fn load_plan(path: &Path) -> Result<LayoutPlan> {
    read_plan(path).map(|(plan, _)| plan)
}

impl OriginalBlockSpec {
    pub fn to_block(&self) -> Result<Block, PlanError> {
        let data = decode_hex(&self.name, &self.data)?;
        if let Some(expected) = &self.sha256 {
            let actual = sha256_bytes(&data);
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(PlanError::DigestMismatch { expected: expected.clone(), actual });
            }
        }
        let mut block = Block::new(BlockId(self.id), &self.name, self.block_type, data);
        block.section = self.section;
        block.alignment = self.alignment;
        block.attributes = parse_attributes(&self.attributes)?;
        block.referrers = self.referrers.clone();
        Ok(block)
    }
}

impl BasicBlockSpec {
    fn payload(&self, original: Option<&Block>) -> Result<Vec<u8>, PlanError> {
        if let Some(text) = &self.data {
            return decode_hex(&self.name, text);
        }
        let (Some(offset), Some(block)) = (self.offset, original) else {
            return Ok(Vec::new());
        };
        if offset < 0 {
            // Left to the factory, which reports the bad offset.
            return Ok(Vec::new());
        }
        let size = self.size.ok_or_else(|| PlanError::MissingPayload(self.name.clone()))?;
        let range = SourceRange::new(offset, size);
        block.data.get(offset as usize..range.end() as usize).map(<[u8]>::to_vec).ok_or_else(|| {
            PlanError::SubGraph(SubGraphError::OutsideOriginalBlock {
                name: self.name.clone(),
                range,
                block_size: block.size(),
            })
        })
    }
}

impl SuccessorSpec {
    fn resolve(
        &self,
        owner: &str,
        index: usize,
        ids: &HashMap<String, BasicBlockId>,
    ) -> Result<Successor, PlanError> {
        match (&self.target, self.target_id, &self.external) {
            (Some(name), None, None) => {
                let id = ids.get(name).ok_or_else(|| PlanError::UnknownBasicBlock {
                    name: name.clone(),
                    context: format!("successor #{index} of '{owner}'"),
                })?;
                Ok(Successor::internal(self.condition, *id))
            }
            (None, Some(raw), None) => Ok(Successor::internal(self.condition, BasicBlockId(raw))),
            (None, None, Some(external)) => {
                Ok(Successor::external(self.condition, external.block, external.offset))
            }
            _ => Err(PlanError::AmbiguousSuccessor { name: owner.to_string(), index }),
        }
    }
}

impl LayoutPlan {
    /// Decode the original block, if the plan has one.
    pub fn original_block(&self) -> Result<Option<Block>, PlanError> {
        self.original_block.as_ref().map(OriginalBlockSpec::to_block).transpose()
    }

    /// Replay the plan into `subgraph` and return the basic-block ids by name.
    ///
    /// Without explicit descriptions, a sub-graph derived from an original
    /// block gets one description mirroring that block: originated basic
    /// blocks in offset order, then generated ones in creation order.
    pub fn populate(
        &self,
        subgraph: &mut BasicBlockSubGraph<'_>,
    ) -> Result<HashMap<String, BasicBlockId>, PlanError> {
        let mut ids: HashMap<String, BasicBlockId> = HashMap::new();
        for spec in &self.basic_blocks {
            if ids.contains_key(&spec.name) {
                return Err(PlanError::DuplicateName(spec.name.clone()));
            }
            let data = spec.payload(subgraph.original_block())?;
            let (offset, size) = match spec.offset {
                None => (BasicBlock::NO_OFFSET, spec.size.unwrap_or(0)),
                Some(offset) => (offset, spec.size.unwrap_or(data.len() as Size)),
            };
            let id = subgraph.add_basic_block(&spec.name, spec.kind, offset, size, &data)?;
            ids.insert(spec.name.clone(), id);
        }

        for spec in &self.basic_blocks {
            let Some(&id) = ids.get(&spec.name) else { continue };
            let mut successors = Vec::with_capacity(spec.successors.len());
            for (index, successor) in spec.successors.iter().enumerate() {
                successors.push(successor.resolve(&spec.name, index, &ids)?);
            }
            if let Some(bb) = subgraph.basic_block_mut(id) {
                for successor in successors {
                    bb.add_successor(successor)?;
                }
                for referrer in &spec.referrers {
                    bb.add_referrer(*referrer);
                }
            }
        }

        if self.descriptions.is_empty() {
            if let Some(block) = subgraph.original_block() {
                let mut order: Vec<BasicBlockId> =
                    subgraph.original_address_space().iter().map(|(_, id)| *id).collect();
                order.extend(subgraph.basic_blocks().filter(|bb| bb.is_generated()).map(|bb| bb.id()));
                let description = subgraph.add_block_description(
                    &block.name,
                    block.block_type,
                    block.section,
                    block.alignment,
                    block.attributes,
                )?;
                description.basic_block_order = order;
            }
        }

        for spec in &self.descriptions {
            let mut order = Vec::with_capacity(spec.basic_blocks.len());
            for name in &spec.basic_blocks {
                let id = ids.get(name).ok_or_else(|| PlanError::UnknownBasicBlock {
                    name: name.clone(),
                    context: format!("description '{}'", spec.name),
                })?;
                order.push(*id);
            }
            let attributes = parse_attributes(&spec.attributes)?;
            let description = subgraph.add_block_description(
                &spec.name,
                spec.block_type,
                spec.section,
                spec.alignment,
                attributes,
            )?;
            description.basic_block_order = order;
        }

        debug!(
            basic_blocks = subgraph.basic_block_count(),
            descriptions = subgraph.block_descriptions().len(),
            "populated sub-graph from plan"
        );
        Ok(ids)
    }

    /// Build a stand-alone sub-graph over `original`.
    pub fn build_sub_graph<'a>(
        &self,
        original: Option<&'a Block>,
    ) -> Result<BasicBlockSubGraph<'a>, PlanError> {
        let mut subgraph = BasicBlockSubGraph::new();
        subgraph.set_original_block(original);
        self.populate(&mut subgraph)?;
        Ok(subgraph)
    }
}

/// Decomposer that replays a layout plan instead of disassembling.
#[derive(Debug, Clone, Copy)]
pub struct PlanDecomposer<'p> {
    pub plan: &'p LayoutPlan,
}

impl Decomposer for PlanDecomposer<'_> {
    fn decompose<'a>(
        &self,
        block: &'a Block,
        subgraph: &mut BasicBlockSubGraph<'a>,
    ) -> Result<(), DecomposeError> {
        subgraph.set_original_block(Some(block));
        self.plan.populate(subgraph).map(|_| ()).map_err(|err| match err {
            PlanError::SubGraph(err) => DecomposeError::SubGraph(err),
            other => DecomposeError::Failed(other.to_string()),
        })
    }
}

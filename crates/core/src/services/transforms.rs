//! Built-in sub-graph transforms.

use std::collections::HashSet;

use crate::model::{BasicBlockId, BasicBlockType, BlockAttributes, BlockType};
use crate::services::transform::{BasicBlockSubGraphTransform, TransformError, TransformPolicy};
use crate::subgraph::{BasicBlockSubGraph, BlockDescription, SizePolicy, SubGraphError};

fn ids_of_kind(subgraph: &BasicBlockSubGraph<'_>, kind: BasicBlockType) -> HashSet<BasicBlockId> {
    subgraph.basic_blocks().filter(|bb| bb.kind() == kind).map(|bb| bb.id()).collect()
}

/// Drops every padding basic block from the composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripPaddingTransform;

impl BasicBlockSubGraphTransform for StripPaddingTransform {
    fn name(&self) -> &'static str {
        "strip-padding"
    }

    fn transform_basic_block_sub_graph(
        &self,
        _policy: &dyn TransformPolicy,
        subgraph: &mut BasicBlockSubGraph<'_>,
    ) -> Result<(), TransformError> {
        let padding = ids_of_kind(subgraph, BasicBlockType::Padding);
        if padding.is_empty() {
            return Ok(());
        }
        for description in subgraph.block_descriptions_mut() {
            description.basic_block_order.retain(|id| !padding.contains(id));
        }
        Ok(())
    }
}

/// Moves the data basic blocks of each code description into a companion
/// data description named `<name>.data`, keeping their relative order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitDataTransform {
    pub policy: SizePolicy,
}

impl BasicBlockSubGraphTransform for SplitDataTransform {
    fn name(&self) -> &'static str {
        "split-data"
    }

    fn transform_basic_block_sub_graph(
        &self,
        _policy: &dyn TransformPolicy,
        subgraph: &mut BasicBlockSubGraph<'_>,
    ) -> Result<(), TransformError> {
        if !BlockDescription::is_valid_alignment(self.policy.data_alignment) {
            return Err(SubGraphError::InvalidAlignment(self.policy.data_alignment).into());
        }
        let data = ids_of_kind(subgraph, BasicBlockType::Data);
        if data.is_empty() {
            return Ok(());
        }

        let mut split = Vec::new();
        for description in subgraph.block_descriptions_mut() {
            if description.block_type != BlockType::Code {
                continue;
            }
            let moved: Vec<BasicBlockId> =
                description.basic_block_order.iter().copied().filter(|id| data.contains(id)).collect();
            if moved.is_empty() {
                continue;
            }
            description.basic_block_order.retain(|id| !data.contains(id));
            split.push((format!("{}.data", description.name), description.section, moved));
        }

        for (name, section, moved) in split {
            let description = subgraph.add_block_description(
                &name,
                BlockType::Data,
                section,
                self.policy.data_alignment,
                BlockAttributes::empty(),
            )?;
            description.basic_block_order.extend(moved);
        }
        Ok(())
    }
}

use serde::Serialize;
use tracing::debug;

use crate::model::{BlockId, BlockType, SectionId, Size};
use crate::services::transform::{SubGraphMerger, TransformError};
use crate::subgraph::{BasicBlockSubGraph, SizePolicy};

/// A block the merger would emit for one block description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBlock {
    pub id: BlockId,
    pub name: String,
    pub block_type: BlockType,
    pub section: SectionId,
    pub alignment: Size,
    pub attributes: Vec<&'static str>,
    /// Upper bound on the emitted size under the merger's size policy.
    pub max_size: usize,
    /// Basic-block names in emission order.
    pub basic_blocks: Vec<String>,
}

/// Merger that records a `PlannedBlock` per description instead of writing
/// into an image. Block ids are handed out sequentially.
#[derive(Debug, Clone, Default)]
pub struct SummaryMerger {
    pub policy: SizePolicy,
    // Past `u32::MAX` once ids are exhausted.
    next_block_id: u64,
    blocks: Vec<PlannedBlock>,
}

impl SummaryMerger {
    pub fn new(policy: SizePolicy, first_block_id: u32) -> Self {
        Self { policy, next_block_id: u64::from(first_block_id), blocks: Vec::new() }
    }

    pub fn blocks(&self) -> &[PlannedBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<PlannedBlock> {
        self.blocks
    }
}

impl SubGraphMerger for SummaryMerger {
    fn merge(&mut self, subgraph: &BasicBlockSubGraph<'_>) -> Result<Vec<BlockId>, TransformError> {
        let mut created = Vec::with_capacity(subgraph.block_descriptions().len());
        for description in subgraph.block_descriptions() {
            let id = u32::try_from(self.next_block_id)
                .map(BlockId)
                .map_err(|_| TransformError::Merge("block id space exhausted".to_string()))?;
            self.next_block_id += 1;

            let basic_blocks = description
                .basic_block_order
                .iter()
                .filter_map(|bb| subgraph.basic_block(*bb))
                .map(|bb| bb.name().to_string())
                .collect();
            let planned = PlannedBlock {
                id,
                name: description.name.clone(),
                block_type: description.block_type,
                section: description.section,
                alignment: description.effective_alignment(),
                attributes: description.attributes.names(),
                max_size: description.max_size_with(subgraph, &self.policy),
                basic_blocks,
            };
            debug!(%id, name = %planned.name, max_size = planned.max_size, "planned block");
            self.blocks.push(planned);
            created.push(id);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockAttributes;

    #[test]
    fn last_block_id_is_assigned_before_exhaustion() {
        let mut subgraph = BasicBlockSubGraph::new();
        subgraph
            .add_block_description("only", BlockType::Code, 0, 0, BlockAttributes::empty())
            .unwrap();

        let mut merger = SummaryMerger::new(SizePolicy::default(), u32::MAX);
        assert_eq!(merger.merge(&subgraph).unwrap(), vec![BlockId(u32::MAX)]);
        assert!(matches!(merger.merge(&subgraph), Err(TransformError::Merge(_))));
        assert_eq!(merger.blocks().len(), 1);
    }
}

use subgraph_core::model::{
    BasicBlock, BasicBlockId, BasicBlockType, Block, BlockAttributes, BlockId, BlockType,
    BranchCondition, Successor,
};
use subgraph_core::services::summary::SummaryMerger;
use subgraph_core::services::transform::{
    apply_basic_block_sub_graph_transform, apply_basic_block_sub_graph_transforms,
    default_transform_registry, BasicBlockSubGraphTransform, DecomposeError, Decomposer,
    DefaultTransformPolicy, TransformError, TransformOutcome, TransformPolicy,
};
use subgraph_core::services::transforms::{SplitDataTransform, StripPaddingTransform};
use subgraph_core::subgraph::{BasicBlockSubGraph, SizePolicy, ValidationCheck};

/// Splits a 24-byte block into code, data, code plus a generated padding block.
#[derive(Default)]
struct FixedDecomposer {
    unsupported: bool,
    dangling: bool,
}

impl Decomposer for FixedDecomposer {
    fn decompose<'a>(
        &self,
        block: &'a Block,
        subgraph: &mut BasicBlockSubGraph<'a>,
    ) -> Result<(), DecomposeError> {
        if self.unsupported {
            return Err(DecomposeError::UnsupportedInstructions(block.name.clone()));
        }
        let entry = subgraph.add_basic_block("entry", BasicBlockType::Code, 0, 8, &block.data[0..8])?;
        let table = subgraph.add_basic_block("table", BasicBlockType::Data, 8, 8, &block.data[8..16])?;
        let tail = subgraph.add_basic_block("tail", BasicBlockType::Code, 16, 8, &block.data[16..24])?;
        let pad = subgraph.add_basic_block("pad", BasicBlockType::Padding, BasicBlock::NO_OFFSET, 0, &[0xcc; 4])?;

        let mut edges = vec![(entry, Successor::internal(BranchCondition::Always, tail))];
        if self.dangling {
            edges.push((tail, Successor::internal(BranchCondition::Always, BasicBlockId(99))));
        }
        for (from, successor) in edges {
            subgraph
                .basic_block_mut(from)
                .ok_or_else(|| DecomposeError::Failed(format!("missing {from}")))?
                .add_successor(successor)
                .map_err(|err| DecomposeError::Failed(err.to_string()))?;
        }

        let desc = subgraph.add_block_description(
            &block.name,
            block.block_type,
            block.section,
            16,
            block.attributes,
        )?;
        desc.basic_block_order.extend([entry, table, tail, pad]);
        Ok(())
    }
}

struct FailingTransform;

impl BasicBlockSubGraphTransform for FailingTransform {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn transform_basic_block_sub_graph(
        &self,
        _policy: &dyn TransformPolicy,
        _subgraph: &mut BasicBlockSubGraph<'_>,
    ) -> Result<(), TransformError> {
        Err(TransformError::Failed { name: self.name().into(), reason: "boom".into() })
    }
}

fn function_block() -> Block {
    let mut block = Block::new(BlockId(5), "func", BlockType::Code, (0u8..24).collect());
    block.section = 2;
    block
}

#[test]
fn default_policy_rejects_data_and_unsafe_blocks() {
    let policy = DefaultTransformPolicy;
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let decomposer = FixedDecomposer::default();

    let mut data = Block::new(BlockId(1), "table", BlockType::Data, vec![0; 24]);
    let err = apply_basic_block_sub_graph_transform(
        &StripPaddingTransform,
        &policy,
        &decomposer,
        &mut merger,
        &mut data,
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::NotCodeBlock(name) if name == "table"));

    let mut asm = function_block();
    asm.set_attribute(BlockAttributes::HAS_INLINE_ASSEMBLY);
    let err = apply_basic_block_sub_graph_transform(
        &StripPaddingTransform,
        &policy,
        &decomposer,
        &mut merger,
        &mut asm,
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::UnsafeToDecompose(_)));
    assert!(merger.blocks().is_empty());
}

#[test]
fn unsupported_instructions_mark_the_block() {
    let policy = DefaultTransformPolicy;
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let decomposer = FixedDecomposer { unsupported: true, ..Default::default() };
    let mut block = function_block();

    let outcome = apply_basic_block_sub_graph_transform(
        &StripPaddingTransform,
        &policy,
        &decomposer,
        &mut merger,
        &mut block,
    )
    .expect("unsupported is not an error");
    assert_eq!(outcome, TransformOutcome::Unsupported);
    assert!(block.attributes.contains(BlockAttributes::UNSUPPORTED_INSTRUCTIONS));
    assert!(merger.blocks().is_empty());

    // The mark makes the block ineligible next time.
    let err = apply_basic_block_sub_graph_transform(
        &StripPaddingTransform,
        &policy,
        &decomposer,
        &mut merger,
        &mut block,
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::UnsafeToDecompose(_)));
}

#[test]
fn single_transform_merges_one_block_per_description() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 40);
    let mut block = function_block();
    let outcome = apply_basic_block_sub_graph_transform(
        &StripPaddingTransform,
        &DefaultTransformPolicy,
        &FixedDecomposer::default(),
        &mut merger,
        &mut block,
    )
    .expect("transform");
    assert_eq!(outcome, TransformOutcome::Merged(vec![BlockId(40)]));

    let planned = &merger.blocks()[0];
    assert_eq!(planned.name, "func");
    assert_eq!(planned.section, 2);
    assert_eq!(planned.alignment, 16);
    assert_eq!(planned.basic_blocks, vec!["entry", "table", "tail"]);
    // entry 8 + one successor 6, table aligned to 16 then 8, tail 8.
    assert_eq!(planned.max_size, 32);
}

#[test]
fn transforms_run_in_order_over_one_decomposition() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let block = function_block();
    let split = SplitDataTransform { policy: SizePolicy::default() };
    let transforms: [&dyn BasicBlockSubGraphTransform; 2] = [&StripPaddingTransform, &split];

    let created = apply_basic_block_sub_graph_transforms(
        &transforms,
        &DefaultTransformPolicy,
        &FixedDecomposer::default(),
        &mut merger,
        &block,
    )
    .expect("pipeline");
    assert_eq!(created, vec![BlockId(1), BlockId(2)]);

    let blocks = merger.into_blocks();
    assert_eq!(blocks[0].name, "func");
    assert_eq!(blocks[0].basic_blocks, vec!["entry", "tail"]);
    assert_eq!(blocks[0].max_size, 8 + 6 + 8);
    assert_eq!(blocks[1].name, "func.data");
    assert_eq!(blocks[1].block_type, BlockType::Data);
    assert_eq!(blocks[1].section, 2);
    assert_eq!(blocks[1].alignment, 4);
    assert_eq!(blocks[1].basic_blocks, vec!["table"]);
    assert_eq!(blocks[1].max_size, 8);
}

#[test]
fn invalid_composition_is_not_merged() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let block = function_block();
    let decomposer = FixedDecomposer { dangling: true, ..Default::default() };

    let transforms: [&dyn BasicBlockSubGraphTransform; 1] = [&StripPaddingTransform];
    let err = apply_basic_block_sub_graph_transforms(
        &transforms,
        &DefaultTransformPolicy,
        &decomposer,
        &mut merger,
        &block,
    )
    .unwrap_err();
    match err {
        TransformError::InvalidComposition { block, report } => {
            assert_eq!(block, "func");
            assert_eq!(report.failed_checks(), vec![ValidationCheck::Successors]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(merger.blocks().is_empty());
}

#[test]
fn transform_failure_stops_the_pipeline() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let transforms: [&dyn BasicBlockSubGraphTransform; 2] = [&FailingTransform, &StripPaddingTransform];
    let err = apply_basic_block_sub_graph_transforms(
        &transforms,
        &DefaultTransformPolicy,
        &FixedDecomposer::default(),
        &mut merger,
        &function_block(),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "transform \"failing\" failed: boom");
    assert!(merger.blocks().is_empty());
}

struct OverlappingDecomposer;

impl Decomposer for OverlappingDecomposer {
    fn decompose<'a>(
        &self,
        block: &'a Block,
        subgraph: &mut BasicBlockSubGraph<'a>,
    ) -> Result<(), DecomposeError> {
        subgraph.add_basic_block("a", BasicBlockType::Code, 0, 8, &block.data[0..8])?;
        subgraph.add_basic_block("b", BasicBlockType::Code, 4, 8, &block.data[4..12])?;
        Ok(())
    }
}

#[test]
fn decomposer_errors_are_reported_by_block() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let err = apply_basic_block_sub_graph_transforms(
        &[],
        &DefaultTransformPolicy,
        &OverlappingDecomposer,
        &mut merger,
        &function_block(),
    )
    .unwrap_err();
    match err {
        TransformError::Decompose { block, source: DecomposeError::SubGraph(inner) } => {
            assert_eq!(block, "func");
            assert!(inner.to_string().contains("overlaps"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn registry_lists_built_in_transforms() {
    let registry = default_transform_registry();
    assert_eq!(registry.names(), vec!["split-data", "strip-padding"]);
    assert_eq!(registry.get("strip-padding").map(|t| t.name()), Some("strip-padding"));
    assert!(registry.get("nope").is_none());
}

#[test]
fn unsupported_instructions_fail_the_multi_transform_pipeline() {
    let mut merger = SummaryMerger::new(SizePolicy::default(), 1);
    let block = function_block();
    let err = apply_basic_block_sub_graph_transforms(
        &[],
        &DefaultTransformPolicy,
        &FixedDecomposer { unsupported: true, ..Default::default() },
        &mut merger,
        &block,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Decompose { source: DecomposeError::UnsupportedInstructions(_), .. }
    ));
    assert!(block.attributes.is_empty());
}

#[test]
fn split_data_with_bad_alignment_leaves_orderings_untouched() {
    let block = function_block();
    let mut subgraph = BasicBlockSubGraph::for_block(&block);
    FixedDecomposer::default().decompose(&block, &mut subgraph).expect("decompose");
    let before: Vec<BasicBlockId> = subgraph.block_descriptions()[0].basic_block_order.clone();

    let split = SplitDataTransform { policy: SizePolicy { max_successor_size: 6, data_alignment: 12 } };
    let err = split
        .transform_basic_block_sub_graph(&DefaultTransformPolicy, &mut subgraph)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::SubGraph(subgraph_core::subgraph::SubGraphError::InvalidAlignment(12))
    ));
    assert_eq!(subgraph.block_descriptions().len(), 1);
    assert_eq!(subgraph.block_descriptions()[0].basic_block_order, before);
    assert!(subgraph.is_valid());
}

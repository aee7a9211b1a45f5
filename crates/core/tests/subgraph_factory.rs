use subgraph_core::model::{
    BasicBlock, BasicBlockId, BasicBlockType, Block, BlockAttributes, BlockId, BlockType,
};
use subgraph_core::subgraph::{BasicBlockSubGraph, SourceRange, SubGraphError};

fn code_block(size: u8) -> Block {
    Block::new(BlockId(1), "func", BlockType::Code, (0..size).collect())
}

#[test]
fn ids_are_distinct_and_increasing_in_creation_order() {
    let mut subgraph = BasicBlockSubGraph::new();
    let ids: Vec<BasicBlockId> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            subgraph
                .add_basic_block(name, BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[0x90])
                .expect("generated block")
        })
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(subgraph.basic_block_count(), 4);
    let names: Vec<&str> = subgraph.basic_blocks().map(|bb| bb.name()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[test]
fn generated_block_keeps_payload_and_has_no_range() {
    let mut subgraph = BasicBlockSubGraph::new();
    let id = subgraph
        .add_basic_block("thunk", BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[0xc3])
        .expect("generated block");
    let bb = subgraph.basic_block(id).expect("stored");
    assert!(bb.is_generated());
    assert_eq!(bb.source_range(), None);
    assert_eq!(bb.data(), &[0xc3]);
    assert!(subgraph.original_address_space().is_empty());
}

#[test]
fn generated_block_with_size_is_rejected_without_consuming_an_id() {
    let mut subgraph = BasicBlockSubGraph::new();
    let err = subgraph
        .add_basic_block("g", BasicBlockType::Code, BasicBlock::NO_OFFSET, 4, &[])
        .unwrap_err();
    assert_eq!(err, SubGraphError::GeneratedWithSize { name: "g".into(), size: 4 });
    assert_eq!(subgraph.basic_block_count(), 0);

    let id = subgraph
        .add_basic_block("ok", BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[])
        .expect("generated block");
    assert_eq!(id, BasicBlockId(0));
}

#[test]
fn originated_block_is_entered_into_address_space() {
    let block = code_block(32);
    let mut subgraph = BasicBlockSubGraph::for_block(&block);
    let id = subgraph
        .add_basic_block("entry", BasicBlockType::Code, 4, 8, &block.data[4..12])
        .expect("originated block");
    assert_eq!(subgraph.original_address_space().len(), 1);
    let (range, mapped) = subgraph.original_address_space().get(4).expect("mapped at 4");
    assert_eq!(*range, SourceRange::new(4, 8));
    assert_eq!(*mapped, id);
    assert_eq!(subgraph.basic_block(id).and_then(|bb| bb.source_range()), Some(*range));
}

#[test]
fn overlapping_range_is_rejected_and_leaves_state_unchanged() {
    let block = code_block(32);
    let mut subgraph = BasicBlockSubGraph::for_block(&block);
    let first = subgraph
        .add_basic_block("a", BasicBlockType::Code, 0, 8, &block.data[0..8])
        .expect("first range");

    let err = subgraph
        .add_basic_block("b", BasicBlockType::Code, 4, 8, &block.data[4..12])
        .unwrap_err();
    assert_eq!(
        err,
        SubGraphError::OverlappingRange {
            name: "b".into(),
            range: SourceRange::new(4, 8),
            existing: first,
        }
    );
    assert_eq!(subgraph.basic_block_count(), 1);
    assert_eq!(subgraph.original_address_space().len(), 1);

    // Adjacent ranges do not overlap.
    let second = subgraph
        .add_basic_block("c", BasicBlockType::Data, 8, 8, &block.data[8..16])
        .expect("adjacent range");
    assert_eq!(second, BasicBlockId(first.0 + 1));
}

#[test]
fn range_must_fit_in_original_block() {
    let block = code_block(32);
    let mut subgraph = BasicBlockSubGraph::for_block(&block);
    let err = subgraph
        .add_basic_block("tail", BasicBlockType::Code, 28, 8, &[0u8; 8])
        .unwrap_err();
    assert!(matches!(err, SubGraphError::OutsideOriginalBlock { block_size: 32, .. }));
    assert_eq!(subgraph.basic_block_count(), 0);
}

#[test]
fn invalid_origins_are_rejected() {
    let block = code_block(16);
    let mut subgraph = BasicBlockSubGraph::for_block(&block);

    let err = subgraph.add_basic_block("neg", BasicBlockType::Code, -5, 2, &[0, 0]).unwrap_err();
    assert_eq!(err, SubGraphError::InvalidOffset { name: "neg".into(), offset: -5 });

    let err = subgraph.add_basic_block("empty", BasicBlockType::Code, 0, 0, &[]).unwrap_err();
    assert_eq!(err, SubGraphError::EmptyRange { name: "empty".into(), offset: 0 });

    let err = subgraph.add_basic_block("pad", BasicBlockType::Padding, 0, 2, &[0, 1]).unwrap_err();
    assert_eq!(err, SubGraphError::PaddingWithOrigin { name: "pad".into(), offset: 0 });

    let err = subgraph.add_basic_block("short", BasicBlockType::Code, 0, 4, &[0, 1]).unwrap_err();
    assert_eq!(
        err,
        SubGraphError::PayloadSizeMismatch { name: "short".into(), expected: 4, actual: 2 }
    );

    assert_eq!(subgraph.basic_block_count(), 0);
    assert!(subgraph.original_address_space().is_empty());
}

#[test]
fn generated_padding_is_allowed() {
    let mut subgraph = BasicBlockSubGraph::new();
    let id = subgraph
        .add_basic_block("pad", BasicBlockType::Padding, BasicBlock::NO_OFFSET, 0, &[0xcc; 3])
        .expect("generated padding");
    assert_eq!(subgraph.basic_block(id).map(|bb| bb.kind()), Some(BasicBlockType::Padding));
}

#[test]
fn successors_are_only_accepted_on_code_blocks() {
    let mut subgraph = BasicBlockSubGraph::new();
    let data = subgraph
        .add_basic_block("table", BasicBlockType::Data, BasicBlock::NO_OFFSET, 0, &[1, 2])
        .expect("data block");
    let bb = subgraph.basic_block_mut(data).expect("stored");
    let err = bb
        .add_successor(subgraph_core::model::Successor::internal(
            subgraph_core::model::BranchCondition::Always,
            data,
        ))
        .unwrap_err();
    assert_eq!(err, subgraph_core::model::BasicBlockError::NotCode(data));
}

#[test]
fn description_factory_checks_alignment() {
    let mut subgraph = BasicBlockSubGraph::new();
    subgraph
        .add_block_description("none", BlockType::Code, 1, 0, BlockAttributes::empty())
        .expect("no-alignment sentinel");
    let desc = subgraph
        .add_block_description("aligned", BlockType::Code, 1, 16, BlockAttributes::empty())
        .expect("power of two");
    assert_eq!(desc.effective_alignment(), 16);

    let err = subgraph
        .add_block_description("odd", BlockType::Code, 1, 3, BlockAttributes::empty())
        .unwrap_err();
    assert_eq!(err, SubGraphError::InvalidAlignment(3));
    assert_eq!(subgraph.block_descriptions().len(), 2);
    assert_eq!(subgraph.block_descriptions()[0].effective_alignment(), 1);
}

#[test]
fn description_ordering_helpers() {
    let mut subgraph = BasicBlockSubGraph::new();
    let desc = subgraph
        .add_block_description("d", BlockType::Code, 0, 0, BlockAttributes::empty())
        .expect("description");
    desc.push(BasicBlockId(1));
    desc.push(BasicBlockId(3));
    desc.insert(1, BasicBlockId(2));
    desc.insert(99, BasicBlockId(4));
    assert_eq!(
        desc.basic_block_order,
        vec![BasicBlockId(1), BasicBlockId(2), BasicBlockId(3), BasicBlockId(4)]
    );
    assert!(desc.remove(BasicBlockId(2)));
    assert!(!desc.remove(BasicBlockId(2)));
    assert!(desc.contains(BasicBlockId(4)));
    assert_eq!(desc.len(), 3);
}

#[test]
fn descriptions_are_editable_in_place() {
    let mut subgraph = BasicBlockSubGraph::new();
    subgraph
        .add_block_description("a", BlockType::Code, 0, 0, BlockAttributes::empty())
        .expect("a");
    subgraph
        .add_block_description("b", BlockType::Data, 0, 4, BlockAttributes::empty())
        .expect("b");
    subgraph.block_descriptions_mut().swap(0, 1);
    subgraph.block_descriptions_mut()[0].name = "renamed".into();
    let names: Vec<&str> = subgraph.block_descriptions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["renamed", "a"]);
}

#[test]
fn basic_block_payload_and_referrers_are_editable() {
    use subgraph_core::model::Referrer;

    let mut subgraph = BasicBlockSubGraph::new();
    let id = subgraph
        .add_basic_block("thunk", BasicBlockType::Code, BasicBlock::NO_OFFSET, 0, &[0x90])
        .expect("generated block");
    let bb = subgraph.basic_block_mut(id).expect("stored");
    bb.data_mut().extend_from_slice(&[0xc3]);
    assert_eq!(bb.data(), &[0x90, 0xc3]);

    let referrer = Referrer::new(BlockId(2), 0, 0);
    assert!(bb.add_referrer(referrer));
    assert!(!bb.add_referrer(referrer));
    assert!(bb.remove_referrer(&referrer));
    assert!(!bb.remove_referrer(&referrer));
    assert!(bb.referrers().is_empty());
}

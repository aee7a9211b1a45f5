use subgraph_core::model::{
    BasicBlock, BasicBlockId, BasicBlockType, BlockAttributes, BlockType, BranchCondition,
    Successor,
};
use subgraph_core::subgraph::{BasicBlockSubGraph, SizePolicy};

fn generated(subgraph: &mut BasicBlockSubGraph<'_>, kind: BasicBlockType, len: usize) -> BasicBlockId {
    subgraph
        .add_basic_block("bb", kind, BasicBlock::NO_OFFSET, 0, &vec![0u8; len])
        .expect("generated block")
}

fn order(subgraph: &mut BasicBlockSubGraph<'_>, ids: &[BasicBlockId]) {
    let desc = subgraph
        .add_block_description("d", BlockType::Code, 0, 0, BlockAttributes::empty())
        .expect("description");
    desc.basic_block_order.extend_from_slice(ids);
}

#[test]
fn code_blocks_reserve_room_for_successors() {
    let mut subgraph = BasicBlockSubGraph::new();
    let head = generated(&mut subgraph, BasicBlockType::Code, 5);
    let left = generated(&mut subgraph, BasicBlockType::Code, 1);
    let right = generated(&mut subgraph, BasicBlockType::Code, 1);
    let bb = subgraph.basic_block_mut(head).expect("head");
    bb.add_successor(Successor::internal(BranchCondition::Equal, left)).expect("code");
    bb.add_successor(Successor::internal(BranchCondition::NotEqual, right)).expect("code");
    order(&mut subgraph, &[head]);

    let desc = &subgraph.block_descriptions()[0];
    assert_eq!(desc.max_size(&subgraph), 5 + 2 * 6);
}

#[test]
fn data_blocks_are_aligned_from_block_start() {
    let mut subgraph = BasicBlockSubGraph::new();
    let code = generated(&mut subgraph, BasicBlockType::Code, 5);
    let table = generated(&mut subgraph, BasicBlockType::Data, 4);
    order(&mut subgraph, &[code, table]);

    let desc = &subgraph.block_descriptions()[0];
    assert_eq!(desc.max_size(&subgraph), 12);

    let policy = SizePolicy { max_successor_size: 5, data_alignment: 16 };
    assert_eq!(desc.max_size_with(&subgraph, &policy), 20);
}

#[test]
fn padding_counts_but_trailing_alignment_does_not() {
    let mut subgraph = BasicBlockSubGraph::new();
    let code = generated(&mut subgraph, BasicBlockType::Code, 2);
    let pad = generated(&mut subgraph, BasicBlockType::Padding, 3);
    order(&mut subgraph, &[code, pad, BasicBlockId(99)]);

    let desc = &subgraph.block_descriptions()[0];
    assert_eq!(desc.max_size(&subgraph), 5);
}

#[test]
fn size_policy_fields_default_individually() {
    let policy: SizePolicy = serde_yaml::from_str("data_alignment: 16").expect("yaml");
    assert_eq!(policy, SizePolicy { max_successor_size: 6, data_alignment: 16 });
    assert_eq!(SizePolicy::default(), SizePolicy { max_successor_size: 6, data_alignment: 4 });
}

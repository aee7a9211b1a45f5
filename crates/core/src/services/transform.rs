use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Block, BlockAttributes, BlockId, BlockType};
use crate::subgraph::{BasicBlockSubGraph, SizePolicy, SubGraphError, ValidationReport};

/// Decides which blocks may be taken apart into basic blocks.
pub trait TransformPolicy: Send + Sync {
    fn block_is_safe_to_basic_block_decompose(&self, block: &Block) -> bool;
}

/// Accepts code blocks that carry none of the "disassembly is not trustworthy" attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransformPolicy;

impl DefaultTransformPolicy {
    const UNSAFE_ATTRIBUTES: BlockAttributes = BlockAttributes::ERRORED_DISASSEMBLY
        .union(BlockAttributes::HAS_INLINE_ASSEMBLY)
        .union(BlockAttributes::BUILT_BY_UNSUPPORTED_COMPILER)
        .union(BlockAttributes::UNSUPPORTED_INSTRUCTIONS)
        .union(BlockAttributes::HAS_EXCEPTION_HANDLING);
}

impl TransformPolicy for DefaultTransformPolicy {
    fn block_is_safe_to_basic_block_decompose(&self, block: &Block) -> bool {
        block.block_type == BlockType::Code
            && !block.attributes.intersects(Self::UNSAFE_ATTRIBUTES)
    }
}

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("block '{0}' contains unsupported instructions")]
    UnsupportedInstructions(String),
    #[error("basic block rejected: {0}")]
    SubGraph(#[from] SubGraphError),
    #[error("{0}")]
    Failed(String),
}

/// Slices an original block into basic blocks (upstream collaborator).
pub trait Decomposer: Send + Sync {
    fn decompose<'a>(
        &self,
        block: &'a Block,
        subgraph: &mut BasicBlockSubGraph<'a>,
    ) -> Result<(), DecomposeError>;
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("block '{0}' is not a code block")]
    NotCodeBlock(String),
    #[error("block '{0}' is not safe to basic-block decompose")]
    UnsafeToDecompose(String),
    #[error("failed to decompose block '{block}': {source}")]
    Decompose {
        block: String,
        #[source]
        source: DecomposeError,
    },
    #[error("transform \"{name}\" failed: {reason}")]
    Failed { name: String, reason: String },
    #[error("composition of block '{block}' is invalid:\n{report}")]
    InvalidComposition { block: String, report: ValidationReport },
    #[error("merge failed: {0}")]
    Merge(String),
    #[error(transparent)]
    SubGraph(#[from] SubGraphError),
}

/// A pass that rewrites the basic-block composition of one block.
pub trait BasicBlockSubGraphTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform_basic_block_sub_graph(
        &self,
        policy: &dyn TransformPolicy,
        subgraph: &mut BasicBlockSubGraph<'_>,
    ) -> Result<(), TransformError>;
}

/// Consumes a validated sub-graph and materializes its descriptions (downstream
/// collaborator). Returns the ids of the blocks it created.
pub trait SubGraphMerger {
    fn merge(&mut self, subgraph: &BasicBlockSubGraph<'_>) -> Result<Vec<BlockId>, TransformError>;
}

/// Result of applying a single transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The transform ran and these blocks were created from the sub-graph.
    Merged(Vec<BlockId>),
    /// The block could not be decomposed; it is now marked
    /// `UNSUPPORTED_INSTRUCTIONS` and was left untouched.
    Unsupported,
}

/// Registry for sub-graph transforms; callers select by name.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn BasicBlockSubGraphTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self { transforms: HashMap::new() }
    }

    pub fn register<T: BasicBlockSubGraphTransform + 'static>(&mut self, transform: T) -> &mut Self {
        self.transforms.insert(transform.name().to_string(), Box::new(transform));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn BasicBlockSubGraphTransform> {
        self.transforms.get(name).map(|t| &**t)
    }

    /// Return a sorted list of registered transform names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.transforms.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with the built-in transforms.
pub fn default_transform_registry() -> TransformRegistry {
    transform_registry_with_policy(SizePolicy::default())
}

/// Built-in transforms, with layout-sensitive ones configured from `policy`.
pub fn transform_registry_with_policy(policy: SizePolicy) -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    registry.register(crate::services::transforms::StripPaddingTransform);
    registry.register(crate::services::transforms::SplitDataTransform { policy });
    registry
}

fn check_preconditions(policy: &dyn TransformPolicy, block: &Block) -> Result<(), TransformError> {
    if block.block_type != BlockType::Code {
        return Err(TransformError::NotCodeBlock(block.name.clone()));
    }
    if !policy.block_is_safe_to_basic_block_decompose(block) {
        return Err(TransformError::UnsafeToDecompose(block.name.clone()));
    }
    Ok(())
}

fn validate_and_merge(
    block: &Block,
    subgraph: &BasicBlockSubGraph<'_>,
    merger: &mut dyn SubGraphMerger,
) -> Result<Vec<BlockId>, TransformError> {
    let report = subgraph.validate();
    if !report.is_valid() {
        return Err(TransformError::InvalidComposition { block: block.name.clone(), report });
    }
    let new_blocks = merger.merge(subgraph)?;
    debug!(block = %block.name, new_blocks = new_blocks.len(), "merged sub-graph");
    Ok(new_blocks)
}

enum Decomposed {
    Merged(Vec<BlockId>),
    Unsupported,
}

fn run_single(
    transform: &dyn BasicBlockSubGraphTransform,
    policy: &dyn TransformPolicy,
    decomposer: &dyn Decomposer,
    merger: &mut dyn SubGraphMerger,
    block: &Block,
) -> Result<Decomposed, TransformError> {
    let mut subgraph = BasicBlockSubGraph::for_block(block);
    match decomposer.decompose(block, &mut subgraph) {
        Ok(()) => {}
        Err(DecomposeError::UnsupportedInstructions(_)) => return Ok(Decomposed::Unsupported),
        Err(source) => {
            return Err(TransformError::Decompose { block: block.name.clone(), source });
        }
    }

    debug!(transform = transform.name(), block = %block.name, "applying transform");
    transform.transform_basic_block_sub_graph(policy, &mut subgraph)?;
    validate_and_merge(block, &subgraph, merger).map(Decomposed::Merged)
}

/// Decompose `block`, apply `transform`, validate and merge the result.
///
/// A block containing unsupported instructions is not an error: it is marked
/// `UNSUPPORTED_INSTRUCTIONS` so it is not processed again.
pub fn apply_basic_block_sub_graph_transform(
    transform: &dyn BasicBlockSubGraphTransform,
    policy: &dyn TransformPolicy,
    decomposer: &dyn Decomposer,
    merger: &mut dyn SubGraphMerger,
    block: &mut Block,
) -> Result<TransformOutcome, TransformError> {
    check_preconditions(policy, block)?;
    match run_single(transform, policy, decomposer, merger, block)? {
        Decomposed::Merged(new_blocks) => Ok(TransformOutcome::Merged(new_blocks)),
        Decomposed::Unsupported => {
            warn!(block = %block.name, "block contains unsupported instruction(s)");
            block.set_attribute(BlockAttributes::UNSUPPORTED_INSTRUCTIONS);
            Ok(TransformOutcome::Unsupported)
        }
    }
}

/// Decompose `block` once, apply every transform in order, then validate and merge.
pub fn apply_basic_block_sub_graph_transforms(
    transforms: &[&dyn BasicBlockSubGraphTransform],
    policy: &dyn TransformPolicy,
    decomposer: &dyn Decomposer,
    merger: &mut dyn SubGraphMerger,
    block: &Block,
) -> Result<Vec<BlockId>, TransformError> {
    check_preconditions(policy, block)?;

    let mut subgraph = BasicBlockSubGraph::for_block(block);
    decomposer
        .decompose(block, &mut subgraph)
        .map_err(|source| TransformError::Decompose { block: block.name.clone(), source })?;

    for transform in transforms {
        debug!(transform = transform.name(), block = %block.name, "applying transform");
        transform.transform_basic_block_sub_graph(policy, &mut subgraph)?;
    }

    validate_and_merge(block, &subgraph, merger)
}

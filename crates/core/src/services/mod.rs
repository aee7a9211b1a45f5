//! Services layered on top of the sub-graph: the transform pipeline, the
//! built-in transforms, plan-driven decomposition and summary merging.

pub mod plan;
pub mod summary;
pub mod transform;
pub mod transforms;

pub use plan::{load_plan, read_plan, LayoutPlan, PlanDecomposer, PlanError};
pub use summary::{PlannedBlock, SummaryMerger};
pub use transform::{
    apply_basic_block_sub_graph_transform, apply_basic_block_sub_graph_transforms,
    default_transform_registry, transform_registry_with_policy, BasicBlockSubGraphTransform,
    DecomposeError, Decomposer, DefaultTransformPolicy, SubGraphMerger, TransformError,
    TransformOutcome, TransformPolicy, TransformRegistry,
};

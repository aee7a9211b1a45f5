use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use subgraph_core::config::{load_config, ComposerConfig};
use subgraph_core::services::plan::PlanDecomposer;
use subgraph_core::services::summary::{PlannedBlock, SummaryMerger};
use subgraph_core::services::transform::{
    apply_basic_block_sub_graph_transforms, transform_registry_with_policy,
    BasicBlockSubGraphTransform, DefaultTransformPolicy,
};

use crate::load_plan_file;

#[derive(Debug, Serialize)]
pub struct LayoutReport {
    pub plan_sha256: String,
    pub original_block: String,
    pub transforms: Vec<String>,
    pub blocks: Vec<PlannedBlock>,
}

/// Run the transform pipeline over the plan's original block.
///
/// Transform names given here override those in the config.
pub fn run_layout(
    plan_path: &Path,
    config_path: Option<&Path>,
    transforms: &[String],
) -> Result<LayoutReport> {
    let loaded = load_plan_file(plan_path)?;
    let block = loaded.original_block.as_ref().ok_or_else(|| {
        anyhow!("Layout plan {} has no original_block to lay out", plan_path.display())
    })?;
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => ComposerConfig::default(),
    };

    let names = if transforms.is_empty() { config.transforms.clone() } else { transforms.to_vec() };
    let registry = transform_registry_with_policy(config.size_policy);
    let mut selected: Vec<&dyn BasicBlockSubGraphTransform> = Vec::with_capacity(names.len());
    for name in &names {
        let transform = registry.get(name).ok_or_else(|| {
            anyhow!("Unknown transform '{}'. Available: {}", name, registry.names().join(", "))
        })?;
        selected.push(transform);
    }

    let decomposer = PlanDecomposer { plan: &loaded.plan };
    let mut merger = SummaryMerger::new(config.size_policy, config.first_block_id);
    apply_basic_block_sub_graph_transforms(
        &selected,
        &DefaultTransformPolicy,
        &decomposer,
        &mut merger,
        block,
    )
    .with_context(|| format!("Failed to lay out block '{}'", block.name))?;
    info!(block = %block.name, blocks = merger.blocks().len(), "layout complete");

    Ok(LayoutReport {
        plan_sha256: loaded.sha256.clone(),
        original_block: block.name.clone(),
        transforms: names,
        blocks: merger.into_blocks(),
    })
}

pub fn layout_command(
    plan_path: &Path,
    config_path: Option<&Path>,
    transforms: &[String],
    json: bool,
) -> Result<()> {
    let report = run_layout(plan_path, config_path, transforms)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Layout of '{}'", report.original_block);
    if report.transforms.is_empty() {
        println!("Transforms: (none)");
    } else {
        println!("Transforms: {}", report.transforms.join(", "));
    }
    println!("Blocks ({}):", report.blocks.len());
    for block in &report.blocks {
        println!(
            "  - {} '{}' [{}] section={} align={} max_size={}",
            block.id,
            block.name,
            block.block_type.as_str(),
            block.section,
            block.alignment,
            block.max_size
        );
        if !block.attributes.is_empty() {
            println!("      attributes: {}", block.attributes.join(", "));
        }
        println!("      basic blocks: {}", block.basic_blocks.join(" "));
    }
    Ok(())
}

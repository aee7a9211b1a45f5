use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use subgraph_core::model::{BasicBlockId, BasicBlockType, Offset};
use subgraph_core::subgraph::SourceRange;

use crate::load_plan_file;

#[derive(Debug, Serialize)]
pub struct BasicBlockHit {
    pub id: BasicBlockId,
    pub name: String,
    pub kind: BasicBlockType,
    pub range: SourceRange,
    pub successors: usize,
}

#[derive(Debug, Serialize)]
pub struct LookupResult {
    pub offset: Offset,
    pub basic_block: Option<BasicBlockHit>,
}

/// Find the basic block whose original range covers `offset`.
pub fn lookup_offset(plan_path: &Path, offset: Offset) -> Result<LookupResult> {
    let loaded = load_plan_file(plan_path)?;
    let subgraph = loaded
        .plan
        .build_sub_graph(loaded.original_block.as_ref())
        .with_context(|| format!("Failed to build sub-graph from {}", plan_path.display()))?;

    let basic_block = subgraph.find_basic_block(offset).and_then(|bb| {
        bb.source_range().map(|range| BasicBlockHit {
            id: bb.id(),
            name: bb.name().to_string(),
            kind: bb.kind(),
            range,
            successors: bb.successors().len(),
        })
    });
    Ok(LookupResult { offset, basic_block })
}

/// Hex for non-negative offsets, decimal otherwise.
pub fn format_offset(offset: Offset) -> String {
    if offset < 0 {
        offset.to_string()
    } else {
        format!("{offset:#x}")
    }
}

pub fn lookup_command(plan_path: &Path, offset: Offset, json: bool) -> Result<()> {
    let result = lookup_offset(plan_path, offset)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match &result.basic_block {
        Some(hit) => println!(
            "offset {}: {} '{}' ({}) {}",
            format_offset(result.offset),
            hit.id,
            hit.name,
            hit.kind.as_str(),
            hit.range
        ),
        None => println!("offset {}: no basic block", format_offset(result.offset)),
    }
    Ok(())
}

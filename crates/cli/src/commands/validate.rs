use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use subgraph_core::subgraph::{ValidationCheck, Violation};

use crate::load_plan_file;

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub check: ValidationCheck,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub struct ViolationInfo {
    pub check: ValidationCheck,
    pub message: String,
    #[serde(flatten)]
    pub detail: Violation,
}

/// Result of validating the sub-graph a plan describes.
#[derive(Debug, Serialize)]
pub struct ValidationSummary {
    pub plan: String,
    pub plan_sha256: String,
    pub original_block: Option<String>,
    pub basic_blocks: usize,
    pub descriptions: usize,
    pub valid: bool,
    pub checks: Vec<CheckStatus>,
    pub violations: Vec<ViolationInfo>,
}

/// Build the plan's sub-graph and run every validation check.
pub fn validate_plan(plan_path: &Path) -> Result<ValidationSummary> {
    let loaded = load_plan_file(plan_path)?;
    let subgraph = loaded
        .plan
        .build_sub_graph(loaded.original_block.as_ref())
        .with_context(|| format!("Failed to build sub-graph from {}", plan_path.display()))?;
    let report = subgraph.validate();

    let checks = ValidationCheck::ALL
        .iter()
        .map(|check| CheckStatus { check: *check, passed: report.passed(*check) })
        .collect();
    let violations = report
        .violations
        .iter()
        .map(|v| ViolationInfo { check: v.check(), message: v.to_string(), detail: v.clone() })
        .collect();

    Ok(ValidationSummary {
        plan: plan_path.display().to_string(),
        plan_sha256: loaded.sha256,
        original_block: loaded.original_block.as_ref().map(|b| b.name.clone()),
        basic_blocks: subgraph.basic_block_count(),
        descriptions: subgraph.block_descriptions().len(),
        valid: report.is_valid(),
        checks,
        violations,
    })
}

/// Validate a plan and print the report. Fails when the composition is invalid.
pub fn validate_command(plan_path: &Path, json: bool) -> Result<()> {
    let summary = validate_plan(plan_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Plan: {} (sha256 {})", summary.plan, summary.plan_sha256);
        println!("Original block: {}", summary.original_block.as_deref().unwrap_or("(none)"));
        println!("Basic blocks: {}", summary.basic_blocks);
        println!("Descriptions: {}", summary.descriptions);
        println!("Checks:");
        for status in &summary.checks {
            let label = if status.passed { "ok" } else { "FAILED" };
            println!("  - {}: {}", status.check.as_str(), label);
        }
        if !summary.violations.is_empty() {
            println!("Violations:");
            for violation in &summary.violations {
                println!("  - [{}] {}", violation.check.as_str(), violation.message);
            }
        }
    }

    if !summary.valid {
        bail!("Composition in {} is invalid ({} violation(s))", summary.plan, summary.violations.len());
    }
    Ok(())
}

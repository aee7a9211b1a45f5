use std::path::Path;

use anyhow::{anyhow, Context, Result};
use subgraph_core::model::{Block, Offset};
use subgraph_core::services::plan::{read_plan, LayoutPlan};
use tracing_subscriber::EnvFilter;

pub mod commands;

/// Install the stderr log subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("Failed to install log subscriber: {err}"))
}

/// Parse a decimal or `0x`-prefixed hexadecimal offset.
pub fn parse_offset(text: &str) -> Result<Offset, String> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (radix, body) = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    if body.starts_with(['+', '-']) {
        return Err(format!("invalid offset '{text}': misplaced sign"));
    }
    let magnitude = i64::from_str_radix(body, radix)
        .map_err(|err| format!("invalid offset '{text}': {err}"))?;
    let value = if negative { -magnitude } else { magnitude };
    Offset::try_from(value).map_err(|_| format!("offset '{text}' is out of range"))
}

/// A plan loaded from disk together with its digest and decoded original block.
#[derive(Debug)]
pub struct LoadedPlan {
    pub plan: LayoutPlan,
    pub sha256: String,
    pub original_block: Option<Block>,
}

pub fn load_plan_file(path: &Path) -> Result<LoadedPlan> {
    let (plan, sha256) = read_plan(path)?;
    let original_block = plan
        .original_block()
        .with_context(|| format!("Invalid original block in {}", path.display()))?;
    Ok(LoadedPlan { plan, sha256, original_block })
}

use std::path::PathBuf;

use anyhow::Result;
use bb_compose::commands::{layout_command, list_transforms_command, lookup_command, validate_command};
use bb_compose::{init_tracing, parse_offset};
use clap::{Parser, Subcommand};
use subgraph_core::model::Offset;

/// Basic-block sub-graph composer CLI.
///
/// A thin wrapper around `subgraph-core` (exposed in code as `subgraph_core`).
/// Plans describing an original block and its basic blocks are loaded from
/// YAML or JSON, validated, queried and laid out through the transform pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "bb-compose",
    version,
    about = "Basic-block sub-graph composer",
    long_about = None
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. warn, info, subgraph_core=debug).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the sub-graph a plan describes and run every validation check.
    ///
    /// Exits non-zero when the composition is invalid.
    Validate {
        /// Layout plan (YAML, or JSON with a .json extension).
        #[arg(long)]
        plan: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Find the basic block covering an offset of the original block.
    Lookup {
        /// Layout plan (YAML, or JSON with a .json extension).
        #[arg(long)]
        plan: PathBuf,

        /// Offset into the original block, decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_offset, allow_hyphen_values = true)]
        offset: Offset,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Decompose the plan's original block, apply transforms, validate and
    /// print the blocks that would be created.
    Layout {
        /// Layout plan (YAML, or JSON with a .json extension).
        #[arg(long)]
        plan: PathBuf,

        /// Composer config (size policy, default transforms, first block id).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Transform to apply, in order. Overrides the config's list.
        #[arg(long = "transform")]
        transforms: Vec<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the registered sub-graph transforms.
    Transforms {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Validate { plan, json } => validate_command(&plan, json)?,
        Command::Lookup { plan, offset, json } => lookup_command(&plan, offset, json)?,
        Command::Layout { plan, config, transforms, json } => {
            layout_command(&plan, config.as_deref(), &transforms, json)?
        }
        Command::Transforms { json } => list_transforms_command(json)?,
    }

    Ok(())
}

use anyhow::Result;
use serde::Serialize;

use subgraph_core::services::transform::default_transform_registry;

#[derive(Debug, Serialize)]
pub struct TransformInfo {
    pub name: String,
    pub description: String,
}

/// Describe the transforms this binary can apply, sorted by name.
pub fn transform_infos() -> Vec<TransformInfo> {
    let registry = default_transform_registry();
    registry
        .names()
        .into_iter()
        .map(|name| {
            let description = match name.as_str() {
                "strip-padding" => "Drop padding basic blocks from every description".to_string(),
                "split-data" => {
                    "Move data basic blocks of code descriptions into '<name>.data' descriptions"
                        .to_string()
                }
                other => format!("Transform '{}'", other),
            };
            TransformInfo { name, description }
        })
        .collect()
}

/// List registered sub-graph transforms.
pub fn list_transforms_command(json: bool) -> Result<()> {
    let entries = transform_infos();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Transforms: (none)");
        return Ok(());
    }

    println!("Transforms:");
    for entry in entries {
        println!("- {}: {}", entry.name, entry.description);
    }

    Ok(())
}

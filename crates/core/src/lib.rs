//! subgraph-core
//!
//! Basic-block sub-graph IR for block-level binary rewriting.
//!
//! A block of an image is taken apart into code, data and padding basic
//! blocks owned by a `BasicBlockSubGraph`. Transforms then rearrange those
//! basic blocks into block descriptions, the composition is validated, and a
//! merger materializes one block per description.

pub mod config;
pub mod model;
pub mod services;
pub mod subgraph;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

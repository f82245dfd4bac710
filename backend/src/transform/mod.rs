//! Transformation module.
//!
//! - Remap: dataset renaming before rendering
//! - Pipeline: load, remap, render, prettify and validate in one call

pub mod pipeline;
pub mod remap;

pub use pipeline::*;
pub use remap::remap_keys;

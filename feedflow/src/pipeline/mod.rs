//! Flow run execution.
//!
//! This module provides:
//! - The pipeline executor (fetch, transform chain, selective delivery)
//! - Transform input resolution over declared requirements

mod executor;
mod resolve;

pub use executor::PipelineExecutor;
pub use resolve::resolve_transform_input;

#[cfg(test)]
mod integration_tests;

//! Core domain model types for feedflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - The record type that flows through pipelines
//! - Run status, run reports and plugin outcomes

mod record;
mod status;

pub use record::{render_time, Payload, Record, RecordBuilder};
pub use status::{PluginOutcome, RunReport, RunStatus};

//! Testing utilities for feedflow flows.
//!
//! This module provides:
//! - Plugin doubles that record calls or fail on demand
//! - Record fixtures
//! - Assertions for run reports and counters

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_counters, assert_run_skipped, assert_run_status};
pub use fixtures::{record, record_at, records};
pub use mocks::{
    FailingSink, FailingTransformer, GateFetcher, RecordingSink, RecordingTransformer,
    StaticFetcher,
};

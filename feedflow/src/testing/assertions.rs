//! Assertions for run reports and counters.

use crate::core::{RunReport, RunStatus};
use crate::flow::{CounterSnapshot, Flow};

/// Asserts that the run ended with the expected status.
pub fn assert_run_status(report: &RunReport, expected: RunStatus) {
    assert_eq!(
        report.status, expected,
        "Expected flow '{}' to end with {}, got {}",
        report.flow, expected, report.status
    );
}

/// Asserts that a run did no stage work.
pub fn assert_run_skipped(report: &RunReport) {
    assert!(
        !report.status.executed(),
        "Expected flow '{}' run to be skipped, got {}",
        report.flow,
        report.status
    );
    assert_eq!(report.fetched, 0, "Skipped run fetched records");
    assert_eq!(report.sends, 0, "Skipped run sent records");
}

/// Asserts the flow's current (undrained) counters.
pub fn assert_counters(flow: &Flow, expected: CounterSnapshot) {
    let actual = flow.counters().snapshot();
    assert_eq!(
        actual,
        expected,
        "Unexpected counters for flow '{}'",
        flow.name()
    );
}

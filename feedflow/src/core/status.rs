//! Run status and plugin outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a single flow run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    /// A previous run of the flow still held the lock.
    Skipped,
    /// The run quota was reached before the run started.
    QuotaExhausted,
    /// The fetcher succeeded with zero records.
    NoData,
    /// The fetcher returned a fatal error.
    FetchFailed,
    /// A transformer failed; nothing was delivered.
    TransformFailed {
        /// Id of the failing transform.
        id: usize,
    },
    /// A sink send failed; earlier sends of this run stand.
    DeliveryFailed {
        /// Transform whose output was being delivered (`None` for the
        /// fetch-output fallback delivery).
        id: Option<usize>,
    },
    /// All stages ran.
    Completed,
}

impl RunStatus {
    /// Returns true if the flow's stages actually executed.
    #[must_use]
    pub fn executed(&self) -> bool {
        !matches!(self, Self::Skipped | Self::QuotaExhausted)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::QuotaExhausted => write!(f, "quota_exhausted"),
            Self::NoData => write!(f, "no_data"),
            Self::FetchFailed => write!(f, "fetch_failed"),
            Self::TransformFailed { id } => write!(f, "transform_failed({id})"),
            Self::DeliveryFailed { id: Some(id) } => write!(f, "delivery_failed({id})"),
            Self::DeliveryFailed { id: None } => write!(f, "delivery_failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Summary of one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Flow name.
    pub flow: String,
    /// Final status.
    pub status: RunStatus,
    /// Records returned by the fetcher (including partial soft-failure sets).
    pub fetched: usize,
    /// Records accepted by the sink.
    pub sent: usize,
    /// Number of `send` calls that succeeded.
    pub sends: usize,
}

impl RunReport {
    /// Creates a report with zero counts.
    #[must_use]
    pub fn new(flow: impl Into<String>, status: RunStatus) -> Self {
        Self {
            flow: flow.into(),
            status,
            fetched: 0,
            sent: 0,
            sends: 0,
        }
    }
}

/// Value reported through a plugin's `log_outcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    /// The plugin produced or delivered this many records.
    Count(usize),
    /// There was nothing to produce or deliver.
    NoData,
    /// The plugin failed.
    Error(String),
}

impl fmt::Display for PluginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n} records"),
            Self::NoData => write!(f, "no data"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::TransformFailed { id: 2 }.to_string(), "transform_failed(2)");
        assert_eq!(RunStatus::DeliveryFailed { id: None }.to_string(), "delivery_failed");
    }

    #[test]
    fn test_run_status_executed() {
        assert!(!RunStatus::Skipped.executed());
        assert!(!RunStatus::QuotaExhausted.executed());
        assert!(RunStatus::NoData.executed());
        assert!(RunStatus::FetchFailed.executed());
    }

    #[test]
    fn test_run_status_serialization() {
        let json = serde_json::to_value(RunStatus::TransformFailed { id: 1 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "transform_failed", "id": 1}));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(PluginOutcome::Count(3).to_string(), "3 records");
        assert_eq!(PluginOutcome::Error("x".into()).to_string(), "error: x");
    }
}

//! Process-wide counter aggregation.
//!
//! The scheduler drains each flow's [`FlowCounters`](crate::flow::FlowCounters)
//! into a [`MetricsAggregator`], labeled by flow and fetcher plugin. The
//! aggregator only accumulates; exposing it over HTTP is left to the caller,
//! which can serve [`MetricsAggregator::render_prometheus`] as-is.

use crate::flow::CounterSnapshot;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Label pair identifying one counter series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricLabels {
    /// Flow name.
    pub flow: String,
    /// Fetcher plugin name.
    pub plugin: String,
}

impl MetricLabels {
    /// Creates a label pair.
    #[must_use]
    pub fn new(flow: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            plugin: plugin.into(),
        }
    }
}

type Series = (&'static str, &'static str, fn(&CounterSnapshot) -> u64);

const SERIES: [Series; 5] = [
    ("feedflow_received_total", "Records fetched.", |s| s.received),
    ("feedflow_sent_total", "Records delivered to sinks.", |s| s.sent),
    ("feedflow_errored_total", "Stage errors.", |s| s.errored),
    ("feedflow_expired_total", "Fetches that reported expired sources.", |s| s.expired),
    ("feedflow_no_data_total", "Fetches that returned no records.", |s| s.no_data),
];

/// Accumulates drained flow counters per label pair.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    totals: DashMap<MetricLabels, CounterSnapshot>,
}

impl MetricsAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a drained snapshot to the series for `(flow, plugin)`.
    ///
    /// All-zero snapshots are ignored so idle flows do not create series.
    pub fn record(&self, flow: &str, plugin: &str, snapshot: CounterSnapshot) {
        if snapshot.is_zero() {
            return;
        }
        *self
            .totals
            .entry(MetricLabels::new(flow, plugin))
            .or_default() += snapshot;
    }

    /// Returns the accumulated totals for one label pair.
    #[must_use]
    pub fn get(&self, flow: &str, plugin: &str) -> Option<CounterSnapshot> {
        self.totals
            .get(&MetricLabels::new(flow, plugin))
            .map(|entry| *entry.value())
    }

    /// Returns every series, ordered by labels.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<MetricLabels, CounterSnapshot> {
        self.totals
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Renders all series in the Prometheus text exposition format.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        for (metric, help, value) in SERIES {
            let _ = writeln!(out, "# HELP {metric} {help}");
            let _ = writeln!(out, "# TYPE {metric} counter");
            for (labels, totals) in &snapshot {
                let _ = writeln!(
                    out,
                    "{metric}{{flow=\"{}\",plugin=\"{}\"}} {}",
                    escape_label(&labels.flow),
                    escape_label(&labels.plugin),
                    value(totals)
                );
            }
        }
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

//! Single-run flow execution.

use super::resolve_transform_input;
use crate::core::{PluginOutcome, Record, RunReport, RunStatus};
use crate::errors::{FetchError, PluginError};
use crate::flow::Flow;
use crate::plugin::Sink;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs one flow to completion: fetch, transform chain, selective delivery.
///
/// Every stage failure is classified, counted on the flow's counters and
/// logged here; nothing propagates past a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Executes `flow` once.
    ///
    /// Returns [`RunStatus::Skipped`] without doing any work when a previous
    /// run still holds the flow lock, and [`RunStatus::QuotaExhausted`] when
    /// the run quota is used up. Otherwise the stages run and, if the flow
    /// has cleanup enabled, the scratch directory is removed afterwards
    /// regardless of outcome.
    pub async fn run(flow: &Flow) -> RunReport {
        let Ok(_guard) = flow.try_lock() else {
            warn!(flow = %flow.name(), "previous run still in progress, skipping");
            return RunReport::new(flow.name(), RunStatus::Skipped);
        };

        if !flow.claim_run() {
            debug!(flow = %flow.name(), quota = flow.run_quota(), "run quota exhausted");
            return RunReport::new(flow.name(), RunStatus::QuotaExhausted);
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("flow_run", flow = %flow.name(), %run_id);

        async {
            let started = Instant::now();
            let report = Self::run_stages(flow).await;

            if flow.cleanup() {
                if let Err(e) = flow.paths().remove_scratch().await {
                    warn!(
                        path = %flow.paths().scratch.display(),
                        error = %e,
                        "failed to remove scratch directory"
                    );
                }
            }

            info!(
                status = %report.status,
                fetched = report.fetched,
                sent = report.sent,
                duration_ms = started.elapsed().as_millis() as u64,
                "flow run finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn run_stages(flow: &Flow) -> RunReport {
        let name = flow.name();
        let counters = flow.counters();
        let fetcher = flow.fetcher();
        let mut report = RunReport::new(name, RunStatus::Completed);

        let fetched = match fetcher.fetch().await {
            Ok(records) if records.is_empty() => {
                counters.inc_no_data();
                fetcher.log_outcome(name, &PluginOutcome::NoData);
                report.status = RunStatus::NoData;
                return report;
            }
            Ok(records) => {
                counters.add_received(records.len() as u64);
                fetcher.log_outcome(name, &PluginOutcome::Count(records.len()));
                records
            }
            Err(FetchError::Fatal(e)) => {
                counters.inc_errored();
                fetcher.log_outcome(name, &PluginOutcome::Error(format!("{e:#}")));
                report.status = RunStatus::FetchFailed;
                return report;
            }
            Err(e) => {
                if matches!(e, FetchError::SourceExpired { .. }) {
                    counters.inc_expired();
                } else {
                    counters.inc_errored();
                }
                fetcher.log_outcome(name, &PluginOutcome::Error(e.to_string()));
                e.into_records()
            }
        };
        report.fetched = fetched.len();

        let mut outputs: BTreeMap<usize, Vec<Record>> = BTreeMap::new();
        for (&id, transformer) in flow.transforms() {
            let input = resolve_transform_input(id, transformer.requires(), &outputs, &fetched);
            match transformer.process(input).await {
                Ok(output) => {
                    transformer.log_outcome(name, &PluginOutcome::Count(output.len()));
                    outputs.insert(id, output);
                }
                Err(e) => {
                    counters.inc_errored();
                    transformer.log_outcome(name, &PluginOutcome::Error(e.to_string()));
                    report.status = RunStatus::TransformFailed { id };
                    return report;
                }
            }
        }

        let Some(sink) = flow.sink() else {
            debug!("no sink configured");
            return report;
        };

        if !flow.transforms().is_empty() {
            let deliverable: Vec<(usize, &Vec<Record>)> = flow
                .transforms()
                .iter()
                .filter(|(_, t)| t.include_in_output())
                .filter_map(|(id, _)| {
                    outputs
                        .get(id)
                        .filter(|out| !out.is_empty())
                        .map(|out| (*id, out))
                })
                .collect();

            if deliverable.is_empty() {
                sink.log_outcome(name, &PluginOutcome::NoData);
                return report;
            }
            for (id, records) in deliverable {
                if Self::deliver(flow, sink, records, &mut report).await.is_err() {
                    report.status = RunStatus::DeliveryFailed { id: Some(id) };
                    return report;
                }
            }
        } else if !fetched.is_empty() {
            if Self::deliver(flow, sink, &fetched, &mut report).await.is_err() {
                report.status = RunStatus::DeliveryFailed { id: None };
            }
        } else {
            sink.log_outcome(name, &PluginOutcome::NoData);
        }

        report
    }

    async fn deliver(
        flow: &Flow,
        sink: &Arc<dyn Sink>,
        records: &[Record],
        report: &mut RunReport,
    ) -> Result<(), PluginError> {
        match sink.send(records).await {
            Ok(()) => {
                flow.counters().add_sent(records.len() as u64);
                report.sent += records.len();
                report.sends += 1;
                sink.log_outcome(flow.name(), &PluginOutcome::Count(records.len()));
                Ok(())
            }
            Err(e) => {
                flow.counters().inc_errored();
                sink.log_outcome(flow.name(), &PluginOutcome::Error(e.to_string()));
                error!(error = %e, "delivery aborted");
                Err(e)
            }
        }
    }
}

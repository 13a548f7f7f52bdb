//! The top-level scheduling loop.
//!
//! On every tick each flow is evaluated once:
//!
//! - due (interval elapsed) and within quota: a run is spawned, holding a
//!   permit from a semaphore sized `max_concurrent_runs`;
//! - otherwise: the flow's counters are drained into the
//!   [`MetricsAggregator`] if anything accumulated.
//!
//! The scheduler never waits on a flow. Overlap between runs of one flow is
//! prevented by the executor's try-lock, not here.

use crate::config::EngineConfig;
use crate::core::RunReport;
use crate::flow::Flow;
use crate::metrics::MetricsAggregator;
use crate::pipeline::PipelineExecutor;
use crate::shutdown::Shutdown;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Polling tick.
    pub tick: Duration,
    /// Upper bound on simultaneously executing runs.
    pub max_concurrent_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            max_concurrent_runs: 64,
        }
    }
}

impl From<&EngineConfig> for SchedulerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick: config.tick(),
            max_concurrent_runs: config.max_concurrent_runs,
        }
    }
}

/// Drives a fixed set of flows.
#[derive(Debug)]
pub struct Scheduler {
    flows: Vec<Arc<Flow>>,
    aggregator: Arc<MetricsAggregator>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    /// Creates a scheduler. A concurrency limit of zero is raised to one.
    #[must_use]
    pub fn new(
        flows: Vec<Arc<Flow>>,
        aggregator: Arc<MetricsAggregator>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            flows,
            aggregator,
            config,
            permits,
        }
    }

    /// The scheduled flows.
    #[must_use]
    pub fn flows(&self) -> &[Arc<Flow>] {
        &self.flows
    }

    /// The aggregator counters are drained into.
    #[must_use]
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    /// Evaluates every flow once at `now`.
    ///
    /// Returns the handles of the runs launched on this tick. A due flow
    /// that finds no free permit is treated like one that lost the lock:
    /// its launch is dropped, not queued.
    pub fn tick(&self, now: Instant) -> Vec<JoinHandle<RunReport>> {
        let mut launched = Vec::new();

        for flow in &self.flows {
            if flow.quota_allows() && flow.is_due(now) {
                flow.mark_launched(now);
                match Arc::clone(&self.permits).try_acquire_owned() {
                    Ok(permit) => {
                        let flow = Arc::clone(flow);
                        launched.push(tokio::spawn(async move {
                            let report = PipelineExecutor::run(&flow).await;
                            drop(permit);
                            report
                        }));
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            flow = %flow.name(),
                            limit = self.config.max_concurrent_runs,
                            "concurrent run limit reached, skipping launch"
                        );
                    }
                }
            }
            self.flush(flow);
        }

        launched
    }

    /// Drains one flow's counters into the aggregator.
    pub fn flush(&self, flow: &Flow) {
        let drained = flow.counters().drain();
        if drained.is_zero() {
            return;
        }
        debug!(flow = %flow.name(), ?drained, "flushing counters");
        self.aggregator
            .record(flow.name(), flow.fetcher().name(), drained);
    }

    /// Drains every flow's counters into the aggregator.
    pub fn flush_all(&self) {
        for flow in &self.flows {
            self.flush(flow);
        }
    }

    /// Ticks until `shutdown` fires, then waits for in-flight runs and
    /// flushes every flow.
    pub async fn run(&self, shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Vec<JoinHandle<RunReport>> = Vec::new();

        info!(
            flows = self.flows.len(),
            tick_ms = self.config.tick.as_millis() as u64,
            max_concurrent_runs = self.config.max_concurrent_runs,
            "scheduler started"
        );

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                _ = interval.tick() => {
                    let (finished, pending): (Vec<_>, Vec<_>) =
                        in_flight.into_iter().partition(JoinHandle::is_finished);
                    in_flight = pending;
                    log_join_failures(join_all(finished).await);
                    in_flight.extend(self.tick(Instant::now()));
                }
            }
        }

        info!(in_flight = in_flight.len(), "scheduler stopping");
        log_join_failures(join_all(in_flight).await);
        self.flush_all();
        info!("scheduler stopped");
    }
}

fn log_join_failures(results: Vec<Result<RunReport, tokio::task::JoinError>>) {
    for result in results {
        if let Err(e) = result {
            error!(error = %e, "flow run task failed");
        }
    }
}

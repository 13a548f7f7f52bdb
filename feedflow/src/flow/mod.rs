//! The flow entity: one independently scheduled pipeline.
//!
//! A [`Flow`] owns its plugins, its counters, its exclusivity lock and its
//! scheduling bookkeeping. Flows are built once (see [`FlowBuilder`] and
//! [`FlowFactory`]) and shared as `Arc<Flow>` between the scheduler and the
//! executor tasks it spawns.

mod builder;
mod counters;
mod factory;
mod paths;

pub use builder::FlowBuilder;
pub use counters::{CounterSnapshot, FlowCounters};
pub use factory::FlowFactory;
pub use paths::FlowPaths;

use crate::plugin::{Fetcher, Sink, Transformer};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, TryLockError};
use tokio::time::Instant;
use uuid::Uuid;

/// A named pipeline definition with its runtime state.
pub struct Flow {
    id: Uuid,
    name: String,
    interval: Duration,
    run_quota: u64,
    runs: AtomicU64,
    cleanup: bool,
    paths: FlowPaths,
    fetcher: Arc<dyn Fetcher>,
    transforms: BTreeMap<usize, Arc<dyn Transformer>>,
    transform_names: Vec<String>,
    sink: Option<Arc<dyn Sink>>,
    lock: AsyncMutex<()>,
    counters: FlowCounters,
    last_run: Mutex<Option<Instant>>,
}

impl Flow {
    /// Starts building a flow.
    pub fn builder(name: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> FlowBuilder {
        FlowBuilder::new(name, fetcher)
    }

    /// Unique id generated at construction.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Flow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum time between runs.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum number of runs; 0 means unlimited.
    #[must_use]
    pub fn run_quota(&self) -> u64 {
        self.run_quota
    }

    /// Runs started so far.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// Whether scratch is removed after each run.
    #[must_use]
    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    /// The flow's directories.
    #[must_use]
    pub fn paths(&self) -> &FlowPaths {
        &self.paths
    }

    /// The source plugin.
    #[must_use]
    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Transformers keyed by id, iterated in ascending order.
    #[must_use]
    pub fn transforms(&self) -> &BTreeMap<usize, Arc<dyn Transformer>> {
        &self.transforms
    }

    /// Transformer names in declaration order.
    #[must_use]
    pub fn transform_names(&self) -> &[String] {
        &self.transform_names
    }

    /// The destination plugin, if any.
    #[must_use]
    pub fn sink(&self) -> Option<&Arc<dyn Sink>> {
        self.sink.as_ref()
    }

    /// Outcome counters.
    #[must_use]
    pub fn counters(&self) -> &FlowCounters {
        &self.counters
    }

    /// Takes the exclusivity lock without waiting.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, ()>, TryLockError> {
        self.lock.try_lock()
    }

    /// Returns true if the quota leaves room for another run.
    #[must_use]
    pub fn quota_allows(&self) -> bool {
        self.run_quota == 0 || self.runs() < self.run_quota
    }

    /// Reserves one run against the quota.
    ///
    /// Returns false, without incrementing, once a non-zero quota is used
    /// up. The counter never exceeds the quota.
    pub fn claim_run(&self) -> bool {
        if self.run_quota == 0 {
            self.runs.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        self.runs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.run_quota).then_some(n + 1)
            })
            .is_ok()
    }

    /// Returns true if more than `interval` has passed since the last launch.
    /// A flow that never ran is due immediately.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        match *self.last_run.lock() {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Records a launch at `now`.
    pub fn mark_launched(&self, now: Instant) {
        *self.last_run.lock() = Some(now);
    }

    /// Instant of the last launch.
    #[must_use]
    pub fn last_run(&self) -> Option<Instant> {
        *self.last_run.lock()
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("run_quota", &self.run_quota)
            .field("runs", &self.runs())
            .field("fetcher", &self.fetcher.name())
            .field("transforms", &self.transform_names)
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

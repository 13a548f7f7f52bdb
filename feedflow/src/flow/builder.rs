//! Programmatic flow assembly.

use super::{Flow, FlowCounters, FlowPaths};
use crate::config::{check_transform_ids, is_valid_flow_name, DEFAULT_ROOT_DIR};
use crate::errors::{ConfigError, ConfigErrorKind};
use crate::plugin::{Fetcher, Sink, Transformer};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Builder for [`Flow`].
///
/// Transformers are appended in declaration order; each one's declared id
/// must equal its position.
#[derive(Debug)]
pub struct FlowBuilder {
    name: String,
    fetcher: Arc<dyn Fetcher>,
    interval: Duration,
    run_quota: u64,
    cleanup: bool,
    strict_requires: bool,
    root_dir: PathBuf,
    transforms: Vec<Arc<dyn Transformer>>,
    sink: Option<Arc<dyn Sink>>,
}

impl FlowBuilder {
    /// Creates a builder with a one-minute interval and no quota.
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            name: name.into(),
            fetcher,
            interval: Duration::from_secs(60),
            run_quota: 0,
            cleanup: false,
            strict_requires: true,
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            transforms: Vec::new(),
            sink: None,
        }
    }

    /// Sets the run interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the run quota (0 = unlimited).
    #[must_use]
    pub fn run_quota(mut self, quota: u64) -> Self {
        self.run_quota = quota;
        self
    }

    /// Enables scratch removal after each run.
    #[must_use]
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Controls whether forward `requires` are rejected.
    #[must_use]
    pub fn strict_requires(mut self, strict: bool) -> Self {
        self.strict_requires = strict;
        self
    }

    /// Sets the root under which the flow's directories are derived.
    #[must_use]
    pub fn root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = root.into();
        self
    }

    /// Appends a transformer.
    #[must_use]
    pub fn transform(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transforms.push(transformer);
        self
    }

    /// Sets the sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates and builds the flow.
    pub fn build(self) -> Result<Flow, ConfigError> {
        if !is_valid_flow_name(&self.name) {
            return Err(ConfigError::new(&self.name, ConfigErrorKind::InvalidName));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::new(&self.name, ConfigErrorKind::ZeroInterval));
        }
        check_transform_ids(
            &self.name,
            self.transforms
                .iter()
                .map(|t| (t.declaration().id, t.requires())),
            self.strict_requires,
        )?;

        let transform_names = self.transforms.iter().map(|t| t.name().to_string()).collect();
        let transforms: BTreeMap<_, _> = self
            .transforms
            .into_iter()
            .map(|t| (t.declaration().id, t))
            .collect();

        Ok(Flow {
            id: Uuid::new_v4(),
            paths: FlowPaths::for_flow(&self.root_dir, &self.name),
            name: self.name,
            interval: self.interval,
            run_quota: self.run_quota,
            runs: AtomicU64::new(0),
            cleanup: self.cleanup,
            fetcher: self.fetcher,
            transforms,
            transform_names,
            sink: self.sink,
            lock: AsyncMutex::new(()),
            counters: FlowCounters::new(),
            last_run: Mutex::new(None),
        })
    }
}

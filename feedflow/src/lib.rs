//! # Feedflow
//!
//! A scheduled ingestion pipeline engine.
//!
//! Feedflow runs many independently configured flows in one process. Each
//! flow periodically:
//!
//! - **Fetches** new records from a source, using persisted source state to
//!   decide what is new and which sources have gone stale
//! - **Transforms** them through an ordered chain whose stages may consume
//!   the outputs of earlier stages
//! - **Delivers** the outputs marked for delivery to a sink
//!
//! A flow never overlaps with itself, failures stay inside a single run, and
//! per-flow counters are aggregated for scraping.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use feedflow::prelude::*;
//!
//! let config = EngineConfig::from_path("feedflow.json")?;
//! init_logging(&config.log);
//!
//! let registry = PluginRegistry::with_builtins();
//! registry.register_fetcher("rss", Box::new(|ctx| build_rss_fetcher(ctx)));
//!
//! let (flows, _errors) = FlowFactory::build_all(&config, &registry);
//! let metrics = Arc::new(MetricsAggregator::new());
//! let scheduler = Scheduler::new(flows, metrics, SchedulerConfig::from(&config));
//!
//! let shutdown = Shutdown::new();
//! shutdown.trigger_on_ctrl_c();
//! scheduler.run(shutdown).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod flow;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod plugin;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        EngineConfig, FlowConfig, LogConfig, LogFormat, PluginConfig, TimeFormat,
        TransformConfig,
    };
    pub use crate::core::{Payload, PluginOutcome, Record, RunReport, RunStatus};
    pub use crate::errors::{
        ConfigError, ConfigErrorKind, FeedflowError, FetchError, PluginError, StateError,
    };
    pub use crate::flow::{CounterSnapshot, Flow, FlowBuilder, FlowFactory, FlowPaths};
    pub use crate::metrics::MetricsAggregator;
    pub use crate::observability::init_logging;
    pub use crate::pipeline::{resolve_transform_input, PipelineExecutor};
    pub use crate::plugin::{
        Fetcher, PluginContext, PluginRegistry, Sink, TransformDeclaration, Transformer,
    };
    pub use crate::scheduler::{Scheduler, SchedulerConfig};
    pub use crate::shutdown::Shutdown;
    pub use crate::state::{
        ExpireAction, ExpirePolicy, FileStateStore, MemoryStateStore, NewnessMode,
        PollingFetcher, RawItem, SourcePoller, SourceState, StateStore,
    };
    pub use std::sync::Arc;
}

/// Version of the feedflow library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

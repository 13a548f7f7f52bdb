//! Plugin capability contracts.
//!
//! A flow is assembled from three roles: one [`Fetcher`], an ordered chain
//! of [`Transformer`]s and at most one [`Sink`]. The engine only ever talks
//! to these traits; concrete connectors are registered by name in a
//! [`PluginRegistry`].

mod builtin;
mod registry;

pub use builtin::{LogSink, PassthroughTransformer};
pub use registry::{
    FetcherFactory, PluginContext, PluginRegistry, SinkFactory, TransformerFactory,
};

use crate::core::{PluginOutcome, Record};
use crate::errors::{FetchError, PluginError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Source role: pulls new records from upstream.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Fetches records that are new since the previous call.
    ///
    /// `SourceExpired` and `SourceFetchFailed` carry partial results and are
    /// not fatal; any other error aborts the run.
    async fn fetch(&self) -> Result<Vec<Record>, FetchError>;

    /// Reports a count or an error for observability.
    fn log_outcome(&self, flow: &str, outcome: &PluginOutcome) {
        log_plugin_outcome("fetcher", flow, self.name(), outcome);
    }
}

/// Declared position and wiring of a transformer within its flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDeclaration {
    /// Zero-based id, equal to the declaration position.
    pub id: usize,
    /// Ids of earlier transforms whose outputs form this transform's input.
    pub requires: Vec<usize>,
    /// Whether this transform's output is delivered to the sink.
    pub include: bool,
}

impl TransformDeclaration {
    /// Creates a declaration with no requirements that is not delivered.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            requires: Vec::new(),
            include: false,
        }
    }

    /// Sets the required ids.
    #[must_use]
    pub fn with_requires(mut self, requires: impl IntoIterator<Item = usize>) -> Self {
        self.requires = requires.into_iter().collect();
        self
    }

    /// Marks the output for delivery.
    #[must_use]
    pub fn included(mut self) -> Self {
        self.include = true;
        self
    }
}

/// Transform role: maps a record set to a new record set.
#[async_trait]
pub trait Transformer: Send + Sync + Debug {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Returns the declaration this instance was built with.
    fn declaration(&self) -> &TransformDeclaration;

    /// Ids of transforms whose output this one consumes.
    fn requires(&self) -> &[usize] {
        &self.declaration().requires
    }

    /// Whether the output is eligible for delivery.
    fn include_in_output(&self) -> bool {
        self.declaration().include
    }

    /// Processes records. Must accept an empty input.
    async fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, PluginError>;

    /// Reports a count or an error for observability.
    fn log_outcome(&self, flow: &str, outcome: &PluginOutcome) {
        log_plugin_outcome("transformer", flow, self.name(), outcome);
    }
}

/// Destination role: delivers records.
#[async_trait]
pub trait Sink: Send + Sync + Debug {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Delivers one batch of records.
    async fn send(&self, records: &[Record]) -> Result<(), PluginError>;

    /// Reports a count or an error for observability.
    fn log_outcome(&self, flow: &str, outcome: &PluginOutcome) {
        log_plugin_outcome("sink", flow, self.name(), outcome);
    }
}

fn log_plugin_outcome(role: &str, flow: &str, plugin: &str, outcome: &PluginOutcome) {
    match outcome {
        PluginOutcome::Count(count) => {
            tracing::info!(flow, plugin, role, count, "{role} outcome");
        }
        PluginOutcome::NoData => {
            tracing::info!(flow, plugin, role, "{role}: no data");
        }
        PluginOutcome::Error(error) => {
            tracing::warn!(flow, plugin, role, error = %error, "{role} failed");
        }
    }
}

//! Turns configuration into runnable flows.

use super::{Flow, FlowPaths};
use crate::config::{EngineConfig, FlowConfig};
use crate::errors::{ConfigError, ConfigErrorKind};
use crate::plugin::{PluginContext, PluginRegistry, TransformDeclaration};
use std::sync::Arc;
use tracing::{error, info};

/// Builds flows from an [`EngineConfig`] using a [`PluginRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct FlowFactory;

impl FlowFactory {
    /// Builds every valid flow.
    ///
    /// A flow that fails validation or plugin construction is excluded and
    /// its error is logged once and returned; the other flows are unaffected.
    pub fn build_all(
        config: &EngineConfig,
        registry: &PluginRegistry,
    ) -> (Vec<Arc<Flow>>, Vec<ConfigError>) {
        let (valid, mut errors) = config.validate_flows();
        let mut flows = Vec::with_capacity(valid.len());

        for flow_config in valid {
            match Self::build_one(config, flow_config, registry) {
                Ok(flow) => {
                    info!(
                        flow = %flow.name(),
                        flow_id = %flow.id(),
                        fetcher = %flow.fetcher().name(),
                        transforms = ?flow.transform_names(),
                        "flow loaded"
                    );
                    flows.push(Arc::new(flow));
                }
                Err(e) => errors.push(e),
            }
        }

        for e in &errors {
            error!(flow = %e.flow, error = %e, "flow excluded from scheduling");
        }

        (flows, errors)
    }

    /// Builds a single, already validated flow.
    pub fn build_one(
        config: &EngineConfig,
        flow: &FlowConfig,
        registry: &PluginRegistry,
    ) -> Result<Flow, ConfigError> {
        let fail = |kind| ConfigError::new(&flow.name, kind);
        let rejected = |plugin: &str, reason: String| {
            fail(ConfigErrorKind::InvalidParams {
                plugin: plugin.to_string(),
                reason,
            })
        };

        let paths = FlowPaths::for_flow(&config.root_dir, &flow.name);
        let ctx = |params: &serde_json::Value| PluginContext {
            flow: flow.name.clone(),
            paths: paths.clone(),
            params: params.clone(),
            time_formats: config.time_formats.clone(),
        };

        if flow.fetcher.plugin.is_empty() {
            return Err(fail(ConfigErrorKind::MissingFetcher));
        }
        let fetcher = registry
            .create_fetcher(&flow.fetcher.plugin, &ctx(&flow.fetcher.params))
            .ok_or_else(|| {
                fail(ConfigErrorKind::UnknownPlugin {
                    role: "fetcher",
                    plugin: flow.fetcher.plugin.clone(),
                })
            })?
            .map_err(|reason| rejected(&flow.fetcher.plugin, reason))?;

        let mut builder = Flow::builder(&flow.name, fetcher)
            .interval(flow.interval())
            .run_quota(flow.run_quota)
            .cleanup(flow.cleanup)
            .strict_requires(flow.strict_requires)
            .root_dir(&config.root_dir);

        for t in &flow.transforms {
            let declaration = TransformDeclaration {
                id: t.id,
                requires: t.requires.clone(),
                include: t.include,
            };
            let transformer = registry
                .create_transformer(&t.plugin, &ctx(&t.params), declaration)
                .ok_or_else(|| {
                    fail(ConfigErrorKind::UnknownPlugin {
                        role: "transformer",
                        plugin: t.plugin.clone(),
                    })
                })?
                .map_err(|reason| rejected(&t.plugin, reason))?;
            builder = builder.transform(transformer);
        }

        if let Some(sink_config) = &flow.sink {
            let sink = registry
                .create_sink(&sink_config.plugin, &ctx(&sink_config.params))
                .ok_or_else(|| {
                    fail(ConfigErrorKind::UnknownPlugin {
                        role: "sink",
                        plugin: sink_config.plugin.clone(),
                    })
                })?
                .map_err(|reason| rejected(&sink_config.plugin, reason))?;
            builder = builder.sink(sink);
        }

        let built = builder.build()?;
        paths
            .ensure_persistent()
            .map_err(|e| fail(ConfigErrorKind::Filesystem(e.to_string())))?;
        Ok(built)
    }
}

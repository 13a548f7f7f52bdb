//! Name-keyed plugin constructors.

use super::{Fetcher, LogSink, PassthroughTransformer, Sink, TransformDeclaration, Transformer};
use crate::config::TimeFormat;
use crate::flow::FlowPaths;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a plugin constructor gets to see.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Owning flow name.
    pub flow: String,
    /// The flow's directories.
    pub paths: FlowPaths,
    /// Plugin-specific parameters from the configuration.
    pub params: serde_json::Value,
    /// Engine-wide timestamp renderings for produced records.
    pub time_formats: Vec<TimeFormat>,
}

/// Constructor for a fetcher. Errors are human-readable rejection reasons.
pub type FetcherFactory =
    Box<dyn Fn(&PluginContext) -> Result<Arc<dyn Fetcher>, String> + Send + Sync>;

/// Constructor for a transformer.
pub type TransformerFactory = Box<
    dyn Fn(&PluginContext, TransformDeclaration) -> Result<Arc<dyn Transformer>, String>
        + Send
        + Sync,
>;

/// Constructor for a sink.
pub type SinkFactory = Box<dyn Fn(&PluginContext) -> Result<Arc<dyn Sink>, String> + Send + Sync>;

/// Registry mapping plugin names to constructors, one namespace per role.
#[derive(Default)]
pub struct PluginRegistry {
    fetchers: RwLock<HashMap<String, FetcherFactory>>,
    transformers: RwLock<HashMap<String, TransformerFactory>>,
    sinks: RwLock<HashMap<String, SinkFactory>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in `passthrough` transformer and
    /// `log` sink.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_transformer(
            "passthrough",
            Box::new(|_ctx, decl| Ok(Arc::new(PassthroughTransformer::new(decl)) as Arc<dyn Transformer>)),
        );
        registry.register_sink(
            "log",
            Box::new(|ctx| Ok(Arc::new(LogSink::new(&ctx.flow)) as Arc<dyn Sink>)),
        );
        registry
    }

    /// Registers a fetcher constructor, replacing any previous one.
    pub fn register_fetcher(&self, name: impl Into<String>, factory: FetcherFactory) {
        self.fetchers.write().insert(name.into(), factory);
    }

    /// Registers a transformer constructor, replacing any previous one.
    pub fn register_transformer(&self, name: impl Into<String>, factory: TransformerFactory) {
        self.transformers.write().insert(name.into(), factory);
    }

    /// Registers a sink constructor, replacing any previous one.
    pub fn register_sink(&self, name: impl Into<String>, factory: SinkFactory) {
        self.sinks.write().insert(name.into(), factory);
    }

    /// Builds a fetcher. `None` if the name is unknown.
    pub fn create_fetcher(
        &self,
        name: &str,
        ctx: &PluginContext,
    ) -> Option<Result<Arc<dyn Fetcher>, String>> {
        self.fetchers.read().get(name).map(|factory| factory(ctx))
    }

    /// Builds a transformer. `None` if the name is unknown.
    pub fn create_transformer(
        &self,
        name: &str,
        ctx: &PluginContext,
        declaration: TransformDeclaration,
    ) -> Option<Result<Arc<dyn Transformer>, String>> {
        self.transformers
            .read()
            .get(name)
            .map(|factory| factory(ctx, declaration))
    }

    /// Builds a sink. `None` if the name is unknown.
    pub fn create_sink(&self, name: &str, ctx: &PluginContext) -> Option<Result<Arc<dyn Sink>, String>> {
        self.sinks.read().get(name).map(|factory| factory(ctx))
    }

    /// Lists registered names per role as `(fetchers, transformers, sinks)`.
    #[must_use]
    pub fn names(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let sorted = |mut v: Vec<String>| {
            v.sort();
            v
        };
        (
            sorted(self.fetchers.read().keys().cloned().collect()),
            sorted(self.transformers.read().keys().cloned().collect()),
            sorted(self.sinks.read().keys().cloned().collect()),
        )
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (fetchers, transformers, sinks) = self.names();
        f.debug_struct("PluginRegistry")
            .field("fetchers", &fetchers)
            .field("transformers", &transformers)
            .field("sinks", &sinks)
            .finish()
    }
}

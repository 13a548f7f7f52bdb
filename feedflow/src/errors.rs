//! Error types for the feedflow engine.
//!
//! Stage-level failures never unwind past a single flow run: the executor
//! classifies them, bumps the matching counter and logs them. The types
//! here carry enough context for that classification.

use crate::core::Record;
use thiserror::Error;

/// The main error type for feedflow operations.
#[derive(Debug, Error)]
pub enum FeedflowError {
    /// A flow or engine configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Source-state persistence failed.
    #[error("{0}")]
    State(#[from] StateError),

    /// A plugin failed.
    #[error("{0}")]
    Plugin(#[from] PluginError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a failed `Fetcher::fetch` call.
///
/// The two soft variants still carry whatever records were obtained; the
/// run continues with them.
#[derive(Debug, Error)]
pub enum FetchError {
    /// One or more sources produced no update within their staleness window.
    #[error("source expired: {}", sources.join(", "))]
    SourceExpired {
        /// Keys of the stale sources.
        sources: Vec<String>,
        /// Records fetched before the condition was detected.
        records: Vec<Record>,
    },

    /// One or more sources could not be reached.
    #[error("source fetch failed: {}", sources.join(", "))]
    SourceFetchFailed {
        /// Keys of the unreachable sources.
        sources: Vec<String>,
        /// Records fetched from the sources that did respond.
        records: Vec<Record>,
    },

    /// Anything else. Aborts the run.
    #[error("fetch failed: {0:#}")]
    Fatal(#[source] anyhow::Error),
}

impl FetchError {
    /// Creates a fatal fetch error.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(err.into())
    }

    /// Returns true for `SourceExpired` and `SourceFetchFailed`.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }

    /// Consumes the error, returning the partial records it carried.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::SourceExpired { records, .. } | Self::SourceFetchFailed { records, .. } => {
                records
            }
            Self::Fatal(_) => Vec::new(),
        }
    }
}

impl From<StateError> for FetchError {
    fn from(err: StateError) -> Self {
        Self::Fatal(err.into())
    }
}

/// Error raised by a transformer or sink.
#[derive(Debug, Error)]
#[error("plugin '{plugin}' failed: {source:#}")]
pub struct PluginError {
    /// Name of the failing plugin.
    pub plugin: String,
    /// Underlying cause.
    #[source]
    pub source: anyhow::Error,
}

impl PluginError {
    /// Creates a new plugin error.
    pub fn new(plugin: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            plugin: plugin.into(),
            source: source.into(),
        }
    }

    /// Creates a plugin error from a plain message.
    pub fn msg(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(plugin, anyhow::anyhow!(message.into()))
    }
}

/// Reason a flow failed validation at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigErrorKind {
    /// Flow name does not match the allowed pattern.
    #[error("name does not match the allowed pattern")]
    InvalidName,

    /// Two flows share a name.
    #[error("duplicate flow name")]
    DuplicateName,

    /// Interval must be positive.
    #[error("interval must be greater than zero")]
    ZeroInterval,

    /// Transform ids must equal their zero-based position.
    #[error("transform at position {position} declares id {id}")]
    NonSequentialId {
        /// Position in the declaration list.
        position: usize,
        /// Declared id.
        id: usize,
    },

    /// A transform requires an id that is not strictly smaller than its own.
    #[error("transform {id} requires {required}, which is not an earlier transform")]
    ForwardRequire {
        /// The declaring transform.
        id: usize,
        /// The offending required id.
        required: usize,
    },

    /// No constructor registered for a plugin name.
    #[error("unknown {role} plugin '{plugin}'")]
    UnknownPlugin {
        /// Plugin role (fetcher, transformer, sink).
        role: &'static str,
        /// Configured plugin name.
        plugin: String,
    },

    /// A plugin constructor rejected its parameters.
    #[error("plugin '{plugin}' rejected its parameters: {reason}")]
    InvalidParams {
        /// Configured plugin name.
        plugin: String,
        /// Constructor's explanation.
        reason: String,
    },

    /// The flow has no fetcher.
    #[error("flow has no fetcher")]
    MissingFetcher,

    /// The flow's directories could not be created.
    #[error("could not prepare flow directories: {0}")]
    Filesystem(String),

    /// The configuration file could not be parsed.
    #[error("{0}")]
    Parse(String),
}

/// Error raised when a flow (or the engine configuration) fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid flow '{flow}': {kind}")]
pub struct ConfigError {
    /// The flow name (empty for engine-level errors).
    pub flow: String,
    /// What was wrong.
    pub kind: ConfigErrorKind,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(flow: impl Into<String>, kind: ConfigErrorKind) -> Self {
        Self {
            flow: flow.into(),
            kind,
        }
    }
}

/// Errors from the source-state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state io error at {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted state could not be decoded or encoded.
    #[error("state serialization error for flow '{flow}': {source}")]
    Serialization {
        /// Flow whose state was involved.
        flow: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

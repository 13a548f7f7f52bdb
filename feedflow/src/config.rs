//! Engine and flow configuration.
//!
//! Configuration is plain JSON deserialized with serde. Parsing of
//! plugin-specific parameters is left to the plugin constructors; this
//! module only validates the fields the engine itself relies on.

use crate::errors::{ConfigError, ConfigErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Pattern every flow name must match.
pub const FLOW_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$";

#[allow(clippy::expect_used)]
fn flow_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FLOW_NAME_PATTERN).expect("flow name pattern compiles"))
}

/// Returns true if `name` is an acceptable flow name.
#[must_use]
pub fn is_valid_flow_name(name: &str) -> bool {
    flow_name_regex().is_match(name)
}

/// Checks that transform ids equal their position and, when `strict`, that
/// every required id names an earlier transform.
pub(crate) fn check_transform_ids<'a>(
    flow: &str,
    declarations: impl IntoIterator<Item = (usize, &'a [usize])>,
    strict: bool,
) -> Result<(), ConfigError> {
    for (position, (id, requires)) in declarations.into_iter().enumerate() {
        if id != position {
            return Err(ConfigError::new(
                flow,
                ConfigErrorKind::NonSequentialId { position, id },
            ));
        }
        if strict {
            if let Some(&required) = requires.iter().find(|&&r| r >= id) {
                return Err(ConfigError::new(
                    flow,
                    ConfigErrorKind::ForwardRequire { id, required },
                ));
            }
        }
    }
    Ok(())
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root under which per-flow data, state and scratch directories live.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Scheduler polling tick in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Upper bound on simultaneously executing flow runs.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Logging setup.
    #[serde(default)]
    pub log: LogConfig,
    /// Formats used to pre-render record timestamps.
    #[serde(default)]
    pub time_formats: Vec<TimeFormat>,
    /// Flow definitions.
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

/// Root directory used when none is configured.
pub const DEFAULT_ROOT_DIR: &str = "./feedflow-data";

fn default_root_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT_DIR)
}

fn default_tick_ms() -> u64 {
    50
}

fn default_max_concurrent_runs() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            tick_ms: default_tick_ms(),
            max_concurrent_runs: default_max_concurrent_runs(),
            log: LogConfig::default(),
            time_formats: Vec::new(),
            flows: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigError::new("", ConfigErrorKind::Parse(e.to_string())))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(
                "",
                ConfigErrorKind::Parse(format!("{}: {e}", path.display())),
            )
        })?;
        Self::from_json_str(&raw)
    }

    /// Returns the scheduler tick as a duration.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Validates every flow, returning the valid ones and the errors for the
    /// rest. A duplicate name invalidates every flow after the first.
    #[must_use]
    pub fn validate_flows(&self) -> (Vec<&FlowConfig>, Vec<ConfigError>) {
        let mut seen = HashSet::new();
        let mut valid = Vec::new();
        let mut errors = Vec::new();

        for flow in &self.flows {
            if !seen.insert(flow.name.as_str()) {
                errors.push(ConfigError::new(&flow.name, ConfigErrorKind::DuplicateName));
                continue;
            }
            match flow.validate() {
                Ok(()) => valid.push(flow),
                Err(e) => errors.push(e),
            }
        }

        (valid, errors)
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// A named timestamp rendering: fixed UTC offset plus strftime format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFormat {
    /// Key under which the rendered string is stored on the record.
    pub label: String,
    /// Offset from UTC in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// chrono strftime format string.
    #[serde(default = "default_time_format")]
    pub format: String,
}

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl TimeFormat {
    /// Creates a new time format.
    #[must_use]
    pub fn new(label: impl Into<String>, utc_offset_minutes: i32, format: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            utc_offset_minutes,
            format: format.into(),
        }
    }
}

/// A plugin reference: registered name plus free-form parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Registered plugin name.
    pub plugin: String,
    /// Plugin-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PluginConfig {
    /// Creates a plugin reference without parameters.
    #[must_use]
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            params: serde_json::Value::Null,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// One transform declaration inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Zero-based id; must equal the declaration position.
    pub id: usize,
    /// Registered transformer name.
    pub plugin: String,
    /// Ids of earlier transforms whose output replaces the fetch output as input.
    #[serde(default)]
    pub requires: Vec<usize>,
    /// Whether the output is delivered to the sink.
    #[serde(default)]
    pub include: bool,
    /// Plugin-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Definition of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Unique flow name.
    pub name: String,
    /// Seconds between eligible runs.
    pub interval_secs: u64,
    /// Maximum number of runs; 0 means unlimited.
    #[serde(default)]
    pub run_quota: u64,
    /// Remove the scratch directory after every run.
    #[serde(default)]
    pub cleanup: bool,
    /// Reject `requires` entries that are not earlier transforms.
    #[serde(default = "default_strict_requires")]
    pub strict_requires: bool,
    /// Source plugin.
    pub fetcher: PluginConfig,
    /// Ordered transform chain.
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
    /// Optional destination plugin.
    #[serde(default)]
    pub sink: Option<PluginConfig>,
}

fn default_strict_requires() -> bool {
    true
}

impl FlowConfig {
    /// Creates a minimal flow definition.
    #[must_use]
    pub fn new(name: impl Into<String>, interval_secs: u64, fetcher: PluginConfig) -> Self {
        Self {
            name: name.into(),
            interval_secs,
            run_quota: 0,
            cleanup: false,
            strict_requires: default_strict_requires(),
            fetcher,
            transforms: Vec::new(),
            sink: None,
        }
    }

    /// Returns the run interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Checks the engine-level invariants of this flow.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let err = |kind| Err(ConfigError::new(&self.name, kind));

        if !is_valid_flow_name(&self.name) {
            return err(ConfigErrorKind::InvalidName);
        }
        if self.interval_secs == 0 {
            return err(ConfigErrorKind::ZeroInterval);
        }
        check_transform_ids(
            &self.name,
            self.transforms.iter().map(|t| (t.id, t.requires.as_slice())),
            self.strict_requires,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transform(id: usize, requires: Vec<usize>) -> TransformConfig {
        TransformConfig {
            id,
            plugin: "passthrough".to_string(),
            requires,
            include: true,
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "root_dir": "/var/lib/feedflow",
                "flows": [{
                    "name": "news",
                    "interval_secs": 300,
                    "fetcher": {"plugin": "rss", "params": {"feeds": ["http://a"]}},
                    "transforms": [{"id": 0, "plugin": "passthrough", "include": true}],
                    "sink": {"plugin": "log"}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.max_concurrent_runs, 64);
        assert_eq!(config.log.level, "info");
        let flow = &config.flows[0];
        assert_eq!(flow.run_quota, 0);
        assert!(!flow.cleanup);
        assert!(flow.strict_requires);
        assert_eq!(flow.transforms[0].requires, Vec::<usize>::new());
        assert_eq!(flow.sink.as_ref().unwrap().plugin, "log");
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err.kind, ConfigErrorKind::Parse(_)));
    }

    #[test]
    fn test_flow_name_pattern() {
        assert!(is_valid_flow_name("news-feed_1.v2"));
        assert!(!is_valid_flow_name(""));
        assert!(!is_valid_flow_name("-leading-dash"));
        assert!(!is_valid_flow_name("has space"));
        assert!(!is_valid_flow_name("../escape"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let flow = FlowConfig::new("news", 0, PluginConfig::new("rss"));
        assert_eq!(flow.validate().unwrap_err().kind, ConfigErrorKind::ZeroInterval);
    }

    #[test]
    fn test_validate_rejects_non_sequential_ids() {
        let mut flow = FlowConfig::new("news", 60, PluginConfig::new("rss"));
        flow.transforms = vec![transform(0, vec![]), transform(2, vec![])];

        assert_eq!(
            flow.validate().unwrap_err().kind,
            ConfigErrorKind::NonSequentialId { position: 1, id: 2 }
        );
    }

    #[test]
    fn test_validate_forward_requires_depends_on_strictness() {
        let mut flow = FlowConfig::new("news", 60, PluginConfig::new("rss"));
        flow.transforms = vec![
            transform(0, vec![]),
            transform(1, vec![2]),
            transform(2, vec![0]),
        ];

        assert_eq!(
            flow.validate().unwrap_err().kind,
            ConfigErrorKind::ForwardRequire { id: 1, required: 2 }
        );

        flow.strict_requires = false;
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_self_require() {
        let mut flow = FlowConfig::new("news", 60, PluginConfig::new("rss"));
        flow.transforms = vec![transform(0, vec![0])];
        assert!(flow.validate().is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = EngineConfig {
            flows: vec![
                FlowConfig::new("news", 60, PluginConfig::new("rss")),
                FlowConfig::new("news", 30, PluginConfig::new("rss")),
                FlowConfig::new("bad name", 30, PluginConfig::new("rss")),
            ],
            ..EngineConfig::default()
        };

        let (valid, errors) = config.validate_flows();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].interval_secs, 60);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ConfigErrorKind::DuplicateName);
        assert_eq!(errors[1].kind, ConfigErrorKind::InvalidName);
    }
}

//! The unit of data moving through a flow.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::TimeFormat;

/// Connector-specific record content, addressable by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(serde_json::Map<String, serde_json::Value>);

impl Payload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Returns a field rendered as a string.
    ///
    /// Strings are returned verbatim, other scalars via their JSON form.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<String> {
        self.0.get(field).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Sets a field.
    pub fn insert(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.0.insert(field.into(), value);
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Payload {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// One item produced by a fetcher or transformer.
///
/// Records are immutable once handed to the next stage; transformers emit
/// new records rather than mutating their input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Owning flow.
    pub flow: String,
    /// Plugin that produced the record.
    pub plugin: String,
    /// Source identifier (feed URL, chat id, topic...).
    pub source: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Event time pre-rendered per configured time format, keyed by label.
    #[serde(default)]
    pub rendered_times: BTreeMap<String, String>,
    /// Globally unique id.
    pub id: Uuid,
    /// Connector-specific content.
    #[serde(default)]
    pub payload: Payload,
    /// Non-fatal warnings attached while processing.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Record {
    /// Starts building a record.
    pub fn builder(
        flow: impl Into<String>,
        plugin: impl Into<String>,
        source: impl Into<String>,
    ) -> RecordBuilder {
        RecordBuilder::new(flow, plugin, source)
    }

    /// Resolves a field by name.
    ///
    /// Built-in fields (`flow`, `plugin`, `source`, `id`, `timestamp`) win
    /// over payload fields of the same name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "flow" => Some(self.flow.clone()),
            "plugin" => Some(self.plugin.clone()),
            "source" => Some(self.source.clone()),
            "id" => Some(self.id.to_string()),
            "timestamp" => Some(self.timestamp.to_rfc3339()),
            _ => self
                .rendered_times
                .get(name)
                .cloned()
                .or_else(|| self.payload.get_str(name)),
        }
    }

    /// Returns a copy carrying an extra warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Returns a copy attributed to another plugin with a fresh id.
    #[must_use]
    pub fn derive(&self, plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Builder for [`Record`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    flow: String,
    plugin: String,
    source: String,
    timestamp: DateTime<Utc>,
    payload: Payload,
    formats: Vec<TimeFormat>,
}

impl RecordBuilder {
    /// Creates a builder with the current time as event time.
    pub fn new(
        flow: impl Into<String>,
        plugin: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            flow: flow.into(),
            plugin: plugin.into(),
            source: source.into(),
            timestamp: Utc::now(),
            payload: Payload::new(),
            formats: Vec::new(),
        }
    }

    /// Sets the event time.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets a payload field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(name, value);
        self
    }

    /// Replaces the whole payload.
    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the time formats used to pre-render the event time.
    #[must_use]
    pub fn time_formats(mut self, formats: &[TimeFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Builds the record.
    #[must_use]
    pub fn build(self) -> Record {
        let rendered_times = self
            .formats
            .iter()
            .map(|f| (f.label.clone(), render_time(self.timestamp, f)))
            .collect();

        Record {
            flow: self.flow,
            plugin: self.plugin,
            source: self.source,
            timestamp: self.timestamp,
            rendered_times,
            id: Uuid::new_v4(),
            payload: self.payload,
            warnings: Vec::new(),
        }
    }
}

/// Renders a timestamp in the offset and strftime format of `format`.
///
/// An out-of-range offset falls back to UTC.
#[must_use]
pub fn render_time(timestamp: DateTime<Utc>, format: &TimeFormat) -> String {
    let offset = format
        .utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    timestamp
        .with_timezone(&offset)
        .format(&format.format)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_builder_renders_time_formats() {
        let formats = vec![
            TimeFormat::new("utc", 0, "%Y-%m-%d %H:%M"),
            TimeFormat::new("cet", 60, "%H:%M"),
        ];
        let record = Record::builder("news", "rss", "http://feed")
            .timestamp(sample_time())
            .time_formats(&formats)
            .build();

        assert_eq!(record.rendered_times.get("utc").unwrap(), "2024-03-01 12:30");
        assert_eq!(record.rendered_times.get("cet").unwrap(), "13:30");
    }

    #[test]
    fn test_field_resolution_prefers_builtins() {
        let record = Record::builder("news", "rss", "http://feed")
            .field("title", serde_json::json!("Hello"))
            .field("source", serde_json::json!("shadowed"))
            .field("score", serde_json::json!(7))
            .build();

        assert_eq!(record.field("title").as_deref(), Some("Hello"));
        assert_eq!(record.field("source").as_deref(), Some("http://feed"));
        assert_eq!(record.field("score").as_deref(), Some("7"));
        assert!(record.field("missing").is_none());
    }

    #[test]
    fn test_derive_assigns_new_id() {
        let record = Record::builder("news", "rss", "src").build();
        let derived = record.derive("regex").with_warning("truncated");

        assert_ne!(record.id, derived.id);
        assert_eq!(derived.plugin, "regex");
        assert_eq!(derived.warnings, vec!["truncated".to_string()]);
        assert!(record.warnings.is_empty());
    }
}

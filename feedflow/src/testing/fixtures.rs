//! Record fixtures.

use chrono::{DateTime, Utc};

use crate::core::Record;

/// Creates a record with a `title` payload field.
#[must_use]
pub fn record(flow: &str, source: &str) -> Record {
    Record::builder(flow, "fixture", source)
        .field("title", serde_json::json!(format!("item from {source}")))
        .build()
}

/// Creates a record with a fixed event time.
#[must_use]
pub fn record_at(flow: &str, source: &str, timestamp: DateTime<Utc>) -> Record {
    Record::builder(flow, "fixture", source)
        .timestamp(timestamp)
        .field("title", serde_json::json!(format!("item from {source}")))
        .build()
}

/// Creates `count` records with distinct sources `item-0`, `item-1`, ...
#[must_use]
pub fn records(flow: &str, count: usize) -> Vec<Record> {
    (0..count).map(|i| record(flow, &format!("item-{i}"))).collect()
}

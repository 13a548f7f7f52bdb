//! Source state, expiry and deduplication for fetchers.
//!
//! A fetcher decides what is "new" by comparing upstream items against a
//! persisted [`SourceState`]: per-source checkpoints (newest accepted event
//! time) and, for content-matched sources, a TTL-bounded set of signatures.
//! [`PollingFetcher`] packages the whole cycle for connectors that only
//! know how to read one source.

mod expiry;
mod polling;
mod source_state;
mod store;

pub use expiry::{ActionOutcome, ExpireAction, ExpirePolicy};
pub use polling::{NewnessMode, PollingFetcher, RawItem, SourcePoller};
pub use source_state::{content_signature, SourceState};
#[cfg(test)]
pub use store::MockStateStore;
pub use store::{FileStateStore, MemoryStateStore, StateStore, STATE_FILE};

/// Converts to a chrono duration, saturating at its maximum.
fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

//! Per-flow "what have I already seen" state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

use super::to_chrono;

/// Persisted source state of one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    /// Source key to newest accepted event time.
    #[serde(default)]
    pub checkpoints: BTreeMap<String, DateTime<Utc>>,
    /// Content signature to the time it was first recorded.
    #[serde(default)]
    pub signatures: BTreeMap<String, DateTime<Utc>>,
    /// When the expire action last ran.
    #[serde(default)]
    pub last_expire_action: Option<DateTime<Utc>>,
}

impl SourceState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops checkpoints for sources that are no longer configured.
    ///
    /// Returns the number of entries removed.
    pub fn prune_sources<S: AsRef<str>>(&mut self, sources: &[S]) -> usize {
        let before = self.checkpoints.len();
        self.checkpoints
            .retain(|key, _| sources.iter().any(|s| s.as_ref() == key));
        before - self.checkpoints.len()
    }

    /// Returns the checkpoint of a source.
    #[must_use]
    pub fn checkpoint(&self, source: &str) -> Option<DateTime<Utc>> {
        self.checkpoints.get(source).copied()
    }

    /// Moves a checkpoint forward to `time`. Never moves it backwards.
    pub fn advance_checkpoint(&mut self, source: &str, time: DateTime<Utc>) {
        self.checkpoints
            .entry(source.to_string())
            .and_modify(|cp| *cp = (*cp).max(time))
            .or_insert(time);
    }

    /// Starts tracking a source at `now` if it has no checkpoint yet.
    pub fn ensure_checkpoint(&mut self, source: &str, now: DateTime<Utc>) {
        self.checkpoints.entry(source.to_string()).or_insert(now);
    }

    /// Keeps the items of `source` that are new and advances its checkpoint.
    ///
    /// Without `force`, an item is new iff its event time is strictly after
    /// the stored checkpoint (every item is new for an unseen source). With
    /// `force = Some(n)`, the `n` most recent items are kept regardless. The
    /// checkpoint becomes the maximum of its old value and the kept times,
    /// so out-of-order arrival never moves it backwards. Kept items are
    /// returned in ascending event-time order.
    pub fn select_new<T>(
        &mut self,
        source: &str,
        items: Vec<T>,
        time_of: impl Fn(&T) -> DateTime<Utc>,
        force: Option<usize>,
    ) -> Vec<T> {
        let mut kept: Vec<T> = match (force, self.checkpoint(source)) {
            (Some(_), _) | (None, None) => items,
            (None, Some(cp)) => items.into_iter().filter(|i| time_of(i) > cp).collect(),
        };
        kept.sort_by_key(|i| time_of(i));
        if let Some(n) = force {
            let skip = kept.len().saturating_sub(n);
            kept.drain(..skip);
        }

        if let Some(newest) = kept.iter().map(&time_of).max() {
            self.advance_checkpoint(source, newest);
        }
        kept
    }

    /// Drops signatures older than `ttl`. Returns the number removed.
    pub fn prune_signatures(&mut self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let ttl = to_chrono(ttl);
        let before = self.signatures.len();
        self.signatures.retain(|_, recorded| now - *recorded <= ttl);
        before - self.signatures.len()
    }

    /// Returns true if `signature` has not been recorded.
    #[must_use]
    pub fn is_new_signature(&self, signature: &str) -> bool {
        !self.signatures.contains_key(signature)
    }

    /// Records `signature` as seen at `now`.
    pub fn record_signature(&mut self, signature: impl Into<String>, now: DateTime<Utc>) {
        self.signatures.insert(signature.into(), now);
    }

    /// Returns the sources whose checkpoint is more than `expire_interval`
    /// before `now`, in key order.
    #[must_use]
    pub fn expired_sources(&self, now: DateTime<Utc>, expire_interval: Duration) -> Vec<String> {
        let interval = to_chrono(expire_interval);
        self.checkpoints
            .iter()
            .filter(|(_, cp)| now - **cp > interval)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Hex SHA-256 over field values joined by the ASCII unit separator.
///
/// The separator keeps `["ab", "c"]` and `["a", "bc"]` distinct.
#[must_use]
pub fn content_signature<S: AsRef<str>>(fields: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(field.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

//! A generic fetcher built on source state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{content_signature, ExpirePolicy, SourceState, StateStore};
use crate::config::TimeFormat;
use crate::core::{Payload, Record};
use crate::errors::FetchError;
use crate::plugin::Fetcher;

/// One upstream item before it becomes a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Connector-specific content.
    pub payload: Payload,
}

impl RawItem {
    /// Creates an item.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, payload: Payload) -> Self {
        Self { timestamp, payload }
    }
}

/// Connector half of a [`PollingFetcher`]: reads raw items from one source.
#[async_trait]
pub trait SourcePoller: Send + Sync {
    /// Plugin name reported on produced records.
    fn name(&self) -> &str;

    /// Returns the items currently available at `source`.
    async fn poll(&self, source: &str) -> anyhow::Result<Vec<RawItem>>;
}

/// How newness of an item is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewnessMode {
    /// Strictly newer than the source checkpoint.
    Timestamp,
    /// Content signature over `fields` not seen within `ttl`.
    ///
    /// Event times are not trusted in this mode: a source with at least one
    /// new signature has its checkpoint moved to the fetch time.
    Signature {
        /// Payload fields hashed into the signature.
        fields: Vec<String>,
        /// How long a recorded signature suppresses duplicates.
        ttl: Duration,
    },
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Fetcher that runs the load, prune, select, persist, expire cycle on top
/// of a [`SourcePoller`].
///
/// Per call:
/// 1. load state, drop checkpoints of unconfigured sources and expired
///    signatures;
/// 2. poll every source and keep only new items, advancing checkpoints;
/// 3. persist state;
/// 4. report sources whose checkpoint is older than the expire interval,
///    running the expire action if its debounce delay has passed.
///
/// Unreachable sources yield `SourceFetchFailed`, which takes precedence
/// over `SourceExpired`; both carry the records of the other sources.
pub struct PollingFetcher<P> {
    flow: String,
    poller: P,
    sources: Vec<String>,
    store: Arc<dyn StateStore>,
    mode: NewnessMode,
    force: Option<usize>,
    expiry: Option<ExpirePolicy>,
    time_formats: Vec<TimeFormat>,
    clock: Clock,
}

impl<P: SourcePoller> PollingFetcher<P> {
    /// Creates a timestamp-mode fetcher over `sources`.
    pub fn new(
        flow: impl Into<String>,
        poller: P,
        sources: Vec<String>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            flow: flow.into(),
            poller,
            sources,
            store,
            mode: NewnessMode::Timestamp,
            force: None,
            expiry: None,
            time_formats: Vec::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Sets the newness mode.
    #[must_use]
    pub fn with_mode(mut self, mode: NewnessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Keeps the `n` most recent items per source regardless of state.
    #[must_use]
    pub fn with_force(mut self, n: usize) -> Self {
        self.force = Some(n);
        self
    }

    /// Enables staleness reporting.
    #[must_use]
    pub fn with_expiry(mut self, policy: ExpirePolicy) -> Self {
        self.expiry = Some(policy);
        self
    }

    /// Sets the timestamp renderings for produced records.
    #[must_use]
    pub fn with_time_formats(mut self, formats: Vec<TimeFormat>) -> Self {
        self.time_formats = formats;
        self
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn select(
        &self,
        state: &mut SourceState,
        source: &str,
        items: Vec<RawItem>,
        now: DateTime<Utc>,
    ) -> Vec<RawItem> {
        let kept = match &self.mode {
            NewnessMode::Timestamp => state.select_new(source, items, |i| i.timestamp, self.force),
            NewnessMode::Signature { fields, .. } => {
                let mut kept = Vec::new();
                let mut candidates = items;
                candidates.sort_by_key(|i| i.timestamp);
                if let Some(n) = self.force {
                    let skip = candidates.len().saturating_sub(n);
                    candidates.drain(..skip);
                }
                for item in candidates {
                    let values: Vec<String> = fields
                        .iter()
                        .map(|f| item.payload.get_str(f).unwrap_or_default())
                        .collect();
                    let signature = content_signature(&values);
                    if self.force.is_some() || state.is_new_signature(&signature) {
                        state.record_signature(signature, now);
                        kept.push(item);
                    }
                }
                if !kept.is_empty() {
                    state.advance_checkpoint(source, now);
                }
                kept
            }
        };
        state.ensure_checkpoint(source, now);
        kept
    }

    fn to_record(&self, source: &str, item: RawItem) -> Record {
        Record::builder(&self.flow, self.poller.name(), source)
            .timestamp(item.timestamp)
            .payload(item.payload)
            .time_formats(&self.time_formats)
            .build()
    }

    async fn load_state(&self) -> Result<SourceState, FetchError> {
        let store = Arc::clone(&self.store);
        let flow = self.flow.clone();
        let state = tokio::task::spawn_blocking(move || store.load(&flow))
            .await
            .map_err(FetchError::fatal)??;
        Ok(state)
    }

    /// Persists `state` off the async workers and hands it back.
    async fn save_state(&self, state: SourceState) -> Result<SourceState, FetchError> {
        let store = Arc::clone(&self.store);
        let flow = self.flow.clone();
        let state = tokio::task::spawn_blocking(move || store.save(&flow, &state).map(|()| state))
            .await
            .map_err(FetchError::fatal)??;
        Ok(state)
    }

    async fn run_expiry(&self, state: &mut SourceState, now: DateTime<Utc>) -> Vec<String> {
        let Some(policy) = &self.expiry else {
            return Vec::new();
        };
        let expired = state.expired_sources(now, policy.expire_interval);
        if expired.is_empty() {
            return expired;
        }

        if let Some(action) = &policy.action {
            if action.action_due(state.last_expire_action, now) {
                for source in &expired {
                    let checkpoint = state.checkpoint(source).unwrap_or(now);
                    action.invoke(&self.flow, source, checkpoint).await;
                }
                state.last_expire_action = Some(now);
            } else {
                debug!(flow = %self.flow, "expire action debounced");
            }
        }
        expired
    }
}

#[async_trait]
impl<P: SourcePoller> Fetcher for PollingFetcher<P> {
    fn name(&self) -> &str {
        self.poller.name()
    }

    async fn fetch(&self) -> Result<Vec<Record>, FetchError> {
        let now = (self.clock)();
        let mut state = self.load_state().await?;

        state.prune_sources(&self.sources);
        if let NewnessMode::Signature { ttl, .. } = &self.mode {
            state.prune_signatures(*ttl, now);
        }

        let mut records = Vec::new();
        let mut failed = Vec::new();
        for source in &self.sources {
            match self.poller.poll(source).await {
                Ok(items) => {
                    let kept = self.select(&mut state, source, items, now);
                    records.extend(kept.into_iter().map(|i| self.to_record(source, i)));
                }
                Err(e) => {
                    warn!(flow = %self.flow, source = %source, error = %e, "source poll failed");
                    failed.push(source.clone());
                }
            }
        }

        let mut state = self.save_state(state).await?;

        let last_action = state.last_expire_action;
        let expired = self.run_expiry(&mut state, now).await;
        if state.last_expire_action != last_action {
            self.save_state(state).await?;
        }

        if !failed.is_empty() {
            return Err(FetchError::SourceFetchFailed {
                sources: failed,
                records,
            });
        }
        if !expired.is_empty() {
            return Err(FetchError::SourceExpired {
                sources: expired,
                records,
            });
        }
        Ok(records)
    }
}

impl<P: SourcePoller> std::fmt::Debug for PollingFetcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFetcher")
            .field("flow", &self.flow)
            .field("poller", &self.poller.name())
            .field("sources", &self.sources)
            .field("mode", &self.mode)
            .field("force", &self.force)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

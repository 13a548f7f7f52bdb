//! Hand-written plugin doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::fixtures::records;
use crate::core::Record;
use crate::errors::{FetchError, PluginError};
use crate::plugin::{Fetcher, Sink, TransformDeclaration, Transformer};

#[derive(Debug, Clone)]
enum FetchScript {
    Records(Vec<Record>),
    Expired(Vec<Record>),
    Unreachable(Vec<Record>),
    Fatal(String),
}

/// A fetcher that returns the same scripted result on every call.
#[derive(Debug)]
pub struct StaticFetcher {
    script: FetchScript,
    calls: Mutex<usize>,
}

impl StaticFetcher {
    fn scripted(script: FetchScript) -> Self {
        Self {
            script,
            calls: Mutex::new(0),
        }
    }

    /// Fetches nothing.
    #[must_use]
    pub fn empty(_flow: &str) -> Self {
        Self::scripted(FetchScript::Records(Vec::new()))
    }

    /// Fetches `count` fresh records.
    #[must_use]
    pub fn with_count(flow: &str, count: usize) -> Self {
        Self::scripted(FetchScript::Records(records(flow, count)))
    }

    /// Fetches the given records.
    #[must_use]
    pub fn with_records(records: Vec<Record>) -> Self {
        Self::scripted(FetchScript::Records(records))
    }

    /// Reports an expired source alongside `count` records.
    #[must_use]
    pub fn expired(flow: &str, count: usize) -> Self {
        Self::scripted(FetchScript::Expired(records(flow, count)))
    }

    /// Reports an unreachable source alongside `count` records.
    #[must_use]
    pub fn unreachable(flow: &str, count: usize) -> Self {
        Self::scripted(FetchScript::Unreachable(records(flow, count)))
    }

    /// Fails fatally.
    #[must_use]
    pub fn fatal(_flow: &str, message: impl Into<String>) -> Self {
        Self::scripted(FetchScript::Fatal(message.into()))
    }

    /// Returns the number of fetch calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<Record>, FetchError> {
        *self.calls.lock() += 1;
        match &self.script {
            FetchScript::Records(records) => Ok(records.clone()),
            FetchScript::Expired(records) => Err(FetchError::SourceExpired {
                sources: vec!["static://expired".to_string()],
                records: records.clone(),
            }),
            FetchScript::Unreachable(records) => Err(FetchError::SourceFetchFailed {
                sources: vec!["static://unreachable".to_string()],
                records: records.clone(),
            }),
            FetchScript::Fatal(message) => Err(FetchError::fatal(anyhow::anyhow!(message.clone()))),
        }
    }
}

/// A fetcher that blocks inside `fetch` until released.
#[derive(Debug)]
pub struct GateFetcher {
    records: Vec<Record>,
    gate: Semaphore,
    entered: Notify,
    calls: Mutex<usize>,
}

impl GateFetcher {
    /// Creates a closed gate that will yield `records` once released.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            gate: Semaphore::new(0),
            entered: Notify::new(),
            calls: Mutex::new(0),
        }
    }

    /// Lets one blocked (or future) fetch call through.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Waits until a fetch call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Returns the number of fetch calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Fetcher for GateFetcher {
    fn name(&self) -> &str {
        "gate"
    }

    async fn fetch(&self) -> Result<Vec<Record>, FetchError> {
        *self.calls.lock() += 1;
        self.entered.notify_one();
        let permit = self.gate.acquire().await.map_err(FetchError::fatal)?;
        permit.forget();
        Ok(self.records.clone())
    }
}

/// A transformer that records its inputs.
///
/// By default it forwards its input; with [`emitting`](Self::emitting) it
/// emits a fixed number of fresh records instead.
#[derive(Debug)]
pub struct RecordingTransformer {
    declaration: TransformDeclaration,
    emit: Option<usize>,
    inputs: Mutex<Vec<Vec<Record>>>,
}

impl RecordingTransformer {
    /// Creates a forwarding transformer.
    #[must_use]
    pub fn new(declaration: TransformDeclaration) -> Self {
        Self {
            declaration,
            emit: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Emits `count` records per call regardless of input.
    #[must_use]
    pub fn emitting(mut self, count: usize) -> Self {
        self.emit = Some(count);
        self
    }

    /// Returns the number of process calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns every input received, in call order.
    #[must_use]
    pub fn inputs(&self) -> Vec<Vec<Record>> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Transformer for RecordingTransformer {
    fn name(&self) -> &str {
        "recording"
    }

    fn declaration(&self) -> &TransformDeclaration {
        &self.declaration
    }

    async fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, PluginError> {
        self.inputs.lock().push(records.clone());
        let output = match self.emit {
            Some(count) => (0..count)
                .map(|i| {
                    Record::builder("test", self.name(), format!("t{}-{i}", self.declaration.id))
                        .build()
                })
                .collect(),
            None => records.iter().map(|r| r.derive(self.name())).collect(),
        };
        Ok(output)
    }
}

/// A transformer that always fails.
#[derive(Debug)]
pub struct FailingTransformer {
    declaration: TransformDeclaration,
}

impl FailingTransformer {
    /// Creates a failing transformer.
    #[must_use]
    pub fn new(declaration: TransformDeclaration) -> Self {
        Self { declaration }
    }
}

#[async_trait]
impl Transformer for FailingTransformer {
    fn name(&self) -> &str {
        "failing"
    }

    fn declaration(&self) -> &TransformDeclaration {
        &self.declaration
    }

    async fn process(&self, _records: Vec<Record>) -> Result<Vec<Record>, PluginError> {
        Err(PluginError::msg(self.name(), "transform failed"))
    }
}

/// A sink that records every batch it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Record>>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of send calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.batches.lock().len()
    }

    /// Returns the size of each batch, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// Returns every batch, in call order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, records: &[Record]) -> Result<(), PluginError> {
        self.batches.lock().push(records.to_vec());
        Ok(())
    }
}

/// A sink that accepts a fixed number of sends, then fails.
#[derive(Debug)]
pub struct FailingSink {
    accept: usize,
    attempts: Mutex<usize>,
}

impl FailingSink {
    /// Fails every send.
    #[must_use]
    pub fn always() -> Self {
        Self::after(0)
    }

    /// Accepts the first `accept` sends, then fails.
    #[must_use]
    pub fn after(accept: usize) -> Self {
        Self {
            accept,
            attempts: Mutex::new(0),
        }
    }

    /// Returns the number of send calls, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _records: &[Record]) -> Result<(), PluginError> {
        let mut attempts = self.attempts.lock();
        *attempts += 1;
        if *attempts > self.accept {
            return Err(PluginError::msg(self.name(), "connection refused"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_fetcher_scripts() {
        assert_eq!(StaticFetcher::with_count("f", 3).fetch().await.unwrap().len(), 3);
        assert!(StaticFetcher::empty("f").fetch().await.unwrap().is_empty());

        let err = StaticFetcher::expired("f", 2).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::SourceExpired { .. }));
        assert_eq!(err.into_records().len(), 2);

        let err = StaticFetcher::fatal("f", "nope").fetch().await.unwrap_err();
        assert!(!err.is_soft());
    }

    #[tokio::test]
    async fn test_gate_fetcher_blocks_until_released() {
        let gate = Arc::new(GateFetcher::new(records("f", 1)));
        let task = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.fetch().await })
        };

        gate.entered().await;
        assert!(!task.is_finished());

        gate.release();
        let fetched = task.await.unwrap().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(gate.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_after() {
        let sink = FailingSink::after(1);
        assert!(sink.send(&[]).await.is_ok());
        assert!(sink.send(&[]).await.is_err());
        assert_eq!(sink.attempts(), 2);
    }
}

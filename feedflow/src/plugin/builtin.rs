//! Built-in plugins that need no external connector.

use super::{Sink, TransformDeclaration, Transformer};
use crate::core::Record;
use crate::errors::PluginError;
use async_trait::async_trait;
use tracing::info;

/// Forwards its input unchanged, re-attributed to itself.
#[derive(Debug, Clone)]
pub struct PassthroughTransformer {
    declaration: TransformDeclaration,
}

impl PassthroughTransformer {
    /// Creates a passthrough transformer.
    #[must_use]
    pub fn new(declaration: TransformDeclaration) -> Self {
        Self { declaration }
    }
}

#[async_trait]
impl Transformer for PassthroughTransformer {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn declaration(&self) -> &TransformDeclaration {
        &self.declaration
    }

    async fn process(&self, records: Vec<Record>) -> Result<Vec<Record>, PluginError> {
        Ok(records.iter().map(|r| r.derive(self.name())).collect())
    }
}

/// Writes every delivered record to the log.
#[derive(Debug, Clone)]
pub struct LogSink {
    flow: String,
}

impl LogSink {
    /// Creates a log sink for a flow.
    #[must_use]
    pub fn new(flow: impl Into<String>) -> Self {
        Self { flow: flow.into() }
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, records: &[Record]) -> Result<(), PluginError> {
        for record in records {
            let payload = serde_json::to_string(&record.payload)
                .map_err(|e| PluginError::new(self.name(), e))?;
            info!(
                flow = %self.flow,
                source = %record.source,
                record_id = %record.id,
                timestamp = %record.timestamp,
                warnings = record.warnings.len(),
                payload = %payload,
                "record delivered"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[tokio::test]
    async fn test_passthrough_keeps_content() {
        let t = PassthroughTransformer::new(TransformDeclaration::new(0));
        let input = vec![record("news", "a"), record("news", "b")];

        let output = t.process(input.clone()).await.unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(output[0].payload, input[0].payload);
        assert_eq!(output[0].plugin, "passthrough");
        assert_ne!(output[0].id, input[0].id);
    }

    #[tokio::test]
    async fn test_passthrough_accepts_empty_input() {
        let t = PassthroughTransformer::new(TransformDeclaration::new(0));
        assert!(t.process(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_sink_accepts_records() {
        let sink = LogSink::new("news");
        tokio_test::assert_ok!(sink.send(&[record("news", "a")]).await);
    }
}

//! End-to-end tests for flow execution.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::core::{Payload, RunStatus};
    use crate::flow::{CounterSnapshot, Flow, FlowFactory};
    use crate::metrics::MetricsAggregator;
    use crate::pipeline::PipelineExecutor;
    use crate::plugin::{Fetcher, PluginRegistry, TransformDeclaration};
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use crate::shutdown::Shutdown;
    use crate::state::{
        ExpireAction, ExpirePolicy, FileStateStore, PollingFetcher, RawItem, SourcePoller,
        SourceState, StateStore,
    };
    use crate::testing::{
        assert_counters, assert_run_skipped, assert_run_status, records, GateFetcher,
        RecordingSink, RecordingTransformer, StaticFetcher,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn recording(decl: TransformDeclaration, emit: usize) -> Arc<RecordingTransformer> {
        Arc::new(RecordingTransformer::new(decl).emitting(emit))
    }

    fn sources(records: &[crate::core::Record]) -> Vec<String> {
        records.iter().map(|r| r.source.clone()).collect()
    }

    /// Serves a replaceable list of items for every source.
    #[derive(Default)]
    struct FeedPoller {
        items: Mutex<Vec<RawItem>>,
    }

    #[async_trait]
    impl SourcePoller for Arc<FeedPoller> {
        fn name(&self) -> &str {
            "feed"
        }

        async fn poll(&self, _source: &str) -> anyhow::Result<Vec<RawItem>> {
            Ok(self.items.lock().clone())
        }
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_mutually_exclusive() {
        let gate = Arc::new(GateFetcher::new(records("news", 2)));
        let sink = Arc::new(RecordingSink::new());
        let flow = Arc::new(
            Flow::builder("news", gate.clone())
                .sink(sink.clone())
                .build()
                .unwrap(),
        );

        let first = {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { PipelineExecutor::run(&flow).await })
        };
        gate.entered().await;

        let second = PipelineExecutor::run(&flow).await;
        assert_run_skipped(&second);
        assert_eq!(second.status, RunStatus::Skipped);

        gate.release();
        assert_run_status(&first.await.unwrap(), RunStatus::Completed);
        assert_eq!(gate.calls(), 1);
        assert_eq!(sink.calls(), 1);
        assert_eq!(flow.runs(), 1);
    }

    #[tokio::test]
    async fn test_forward_requirement_yields_empty_input() {
        let t0 = recording(TransformDeclaration::new(0), 2);
        let t1 = recording(TransformDeclaration::new(1).with_requires([2]), 0);
        let t2 = recording(TransformDeclaration::new(2), 4);
        let flow = Flow::builder("news", Arc::new(StaticFetcher::with_count("news", 3)))
            .strict_requires(false)
            .transform(t0)
            .transform(t1.clone())
            .transform(t2)
            .build()
            .unwrap();

        PipelineExecutor::run(&flow).await;

        assert_eq!(t1.inputs(), vec![Vec::new()]);
    }

    #[tokio::test]
    async fn test_required_outputs_concatenate_in_id_order() {
        let t0 = recording(TransformDeclaration::new(0), 2);
        let t1 = recording(TransformDeclaration::new(1), 1);
        let t2 = recording(TransformDeclaration::new(2).with_requires([1, 0]), 0);
        let flow = Flow::builder("news", Arc::new(StaticFetcher::with_count("news", 1)))
            .transform(t0)
            .transform(t1)
            .transform(t2.clone())
            .build()
            .unwrap();

        PipelineExecutor::run(&flow).await;

        assert_eq!(sources(&t2.inputs()[0]), vec!["t0-0", "t0-1", "t1-0"]);
    }

    #[tokio::test]
    async fn test_empty_required_output_still_concatenates() {
        let t0 = recording(TransformDeclaration::new(0), 2);
        let t1 = recording(TransformDeclaration::new(1), 0);
        let t2 = recording(TransformDeclaration::new(2).with_requires([0, 1]), 0);
        let flow = Flow::builder("news", Arc::new(StaticFetcher::with_count("news", 1)))
            .transform(t0)
            .transform(t1)
            .transform(t2.clone())
            .build()
            .unwrap();

        PipelineExecutor::run(&flow).await;

        assert_eq!(sources(&t2.inputs()[0]), vec!["t0-0", "t0-1"]);
    }

    #[tokio::test]
    async fn test_empty_fetch_touches_only_no_data_counter() {
        let t0 = recording(TransformDeclaration::new(0).included(), 1);
        let sink = Arc::new(RecordingSink::new());
        let flow = Flow::builder("news", Arc::new(StaticFetcher::empty("news")))
            .transform(t0.clone())
            .sink(sink.clone())
            .build()
            .unwrap();

        let report = PipelineExecutor::run(&flow).await;

        assert_run_status(&report, RunStatus::NoData);
        assert_eq!(t0.calls(), 0);
        assert_eq!(sink.calls(), 0);
        assert_counters(
            &flow,
            CounterSnapshot {
                no_data: 1,
                ..Default::default()
            },
        );
    }

    #[tokio::test]
    async fn test_only_included_output_is_delivered() {
        let t0 = recording(TransformDeclaration::new(0).included(), 5);
        let t1 = recording(TransformDeclaration::new(1), 5);
        let sink = Arc::new(RecordingSink::new());
        let flow = Flow::builder("news", Arc::new(StaticFetcher::with_count("news", 1)))
            .transform(t0)
            .transform(t1)
            .sink(sink.clone())
            .build()
            .unwrap();

        PipelineExecutor::run(&flow).await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        assert!(batches[0].iter().all(|r| r.source.starts_with("t0-")));
    }

    #[tokio::test]
    async fn test_fetch_output_delivered_without_transforms() {
        let sink = Arc::new(RecordingSink::new());
        let flow = Flow::builder("news", Arc::new(StaticFetcher::with_count("news", 3)))
            .sink(sink.clone())
            .build()
            .unwrap();

        let report = PipelineExecutor::run(&flow).await;

        assert_eq!(sink.batch_sizes(), vec![3]);
        assert_eq!(report.sent, 3);
        assert_counters(
            &flow,
            CounterSnapshot {
                received: 3,
                sent: 3,
                ..Default::default()
            },
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_expire_action_runs_once_per_delay_window() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("expired.log");
        let hook = root.path().join("hook.sh");
        std::fs::write(&hook, format!("#!/bin/sh\necho \"$1 $2 $3\" >> {}\n", log.display())).unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = Arc::new(FileStateStore::under(root.path()));
        let mut seeded = SourceState::new();
        seeded.advance_checkpoint("http://quiet", at(0));
        store.save("news", &seeded).unwrap();

        let now = Arc::new(Mutex::new(at(600)));
        let clock = Arc::clone(&now);
        let policy = ExpirePolicy::new(Duration::from_secs(300)).with_action(
            ExpireAction::new(hook.display().to_string()).with_delay(Duration::from_secs(60)),
        );
        let fetcher = PollingFetcher::new(
            "news",
            Arc::new(FeedPoller::default()),
            vec!["http://quiet".to_string()],
            store.clone(),
        )
        .with_expiry(policy)
        .with_clock(move || *clock.lock());

        let flow = Flow::builder("news", Arc::new(fetcher))
            .root_dir(root.path())
            .build()
            .unwrap();

        assert_eq!(PipelineExecutor::run(&flow).await.status, RunStatus::Completed);
        *now.lock() = at(610);
        PipelineExecutor::run(&flow).await;

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["news http://quiet 1700000000"]);
        assert_eq!(flow.counters().snapshot().expired, 2);
    }

    #[tokio::test]
    async fn test_persisted_checkpoint_is_newest_event_time() {
        let root = tempfile::tempdir().unwrap();
        let poller = Arc::new(FeedPoller::default());
        let store = Arc::new(FileStateStore::under(root.path()));
        let fetcher = PollingFetcher::new(
            "news",
            Arc::clone(&poller),
            vec!["http://feed".to_string()],
            store.clone(),
        )
        .with_clock(|| at(1000));
        let sink = Arc::new(RecordingSink::new());
        let flow = Flow::builder("news", Arc::new(fetcher))
            .root_dir(root.path())
            .sink(sink.clone())
            .build()
            .unwrap();

        *poller.items.lock() = [30, 10, 50, 20]
            .into_iter()
            .map(|s| RawItem::new(at(s), Payload::new()))
            .collect();
        PipelineExecutor::run(&flow).await;
        assert_eq!(store.load("news").unwrap().checkpoint("http://feed"), Some(at(50)));

        *poller.items.lock() = [40, 70, 60]
            .into_iter()
            .map(|s| RawItem::new(at(s), Payload::new()))
            .collect();
        PipelineExecutor::run(&flow).await;
        assert_eq!(store.load("news").unwrap().checkpoint("http://feed"), Some(at(70)));

        assert_eq!(sink.batch_sizes(), vec![4, 2]);
        assert!(flow.paths().state.join("sources.json").exists());
    }

    #[tokio::test]
    async fn test_configured_engine_runs_and_aggregates() {
        let root = tempfile::tempdir().unwrap();
        let json = serde_json::json!({
            "root_dir": root.path(),
            "tick_ms": 5,
            "time_formats": [{"label": "utc", "utc_offset_minutes": 0}],
            "flows": [
                {
                    "name": "news",
                    "interval_secs": 3600,
                    "run_quota": 1,
                    "cleanup": true,
                    "fetcher": {"plugin": "static", "params": {"count": 4}},
                    "transforms": [
                        {"id": 0, "plugin": "passthrough"},
                        {"id": 1, "plugin": "passthrough", "requires": [0], "include": true}
                    ],
                    "sink": {"plugin": "log"}
                },
                {
                    "name": "bad flow name",
                    "interval_secs": 1,
                    "fetcher": {"plugin": "static"}
                },
                {
                    "name": "forward",
                    "interval_secs": 1,
                    "fetcher": {"plugin": "static"},
                    "transforms": [{"id": 0, "plugin": "passthrough", "requires": [1]},
                                   {"id": 1, "plugin": "passthrough", "requires": [2]}]
                }
            ]
        });
        let config = EngineConfig::from_json_str(&json.to_string()).unwrap();

        let registry = PluginRegistry::with_builtins();
        registry.register_fetcher(
            "static",
            Box::new(|ctx| {
                let count = ctx.params.get("count").and_then(serde_json::Value::as_u64).unwrap_or(1);
                let count = usize::try_from(count).map_err(|e| e.to_string())?;
                Ok(Arc::new(StaticFetcher::with_count(&ctx.flow, count)) as Arc<dyn Fetcher>)
            }),
        );

        let (flows, errors) = FlowFactory::build_all(&config, &registry);
        assert_eq!(flows.len(), 1);
        assert_eq!(
            errors.iter().map(|e| e.flow.as_str()).collect::<Vec<_>>(),
            vec!["bad flow name", "forward"]
        );

        let metrics = Arc::new(MetricsAggregator::new());
        let scheduler = Scheduler::new(flows, Arc::clone(&metrics), SchedulerConfig::from(&config));
        let shutdown = Shutdown::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.trigger("test finished");
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown))
            .await
            .unwrap();

        assert_eq!(
            metrics.get("news", "static"),
            Some(CounterSnapshot {
                received: 4,
                sent: 4,
                ..Default::default()
            })
        );
        assert_eq!(scheduler.flows()[0].runs(), 1);
        assert!(metrics
            .render_prometheus()
            .contains("feedflow_sent_total{flow=\"news\",plugin=\"static\"} 4"));
    }
}

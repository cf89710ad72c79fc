// src/ingest/scheduler.rs
use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;
use crate::ingest::backoff::BackoffPolicy;
use crate::ingest::fetcher::ConditionalFetcher;
use crate::ingest::provider::ProviderMonitor;
use crate::ingest::types::ProviderConfig;
use crate::ingest::EventSink;

/// A provider left out of the run because its configuration is unusable.
#[derive(Debug, Clone)]
pub struct RejectedProvider {
    pub config: ProviderConfig,
    pub error: MonitorError,
}

/// Owns one `ProviderMonitor` per configured feed and runs them side by side.
pub struct StatusMonitor {
    monitors: Vec<ProviderMonitor>,
    rejected: Vec<RejectedProvider>,
}

impl StatusMonitor {
    /// Build monitors sharing `fetcher`. Invalid configs and repeated
    /// provider ids are excluded and reported through `rejected()`.
    pub fn new(configs: Vec<ProviderConfig>, fetcher: Arc<dyn ConditionalFetcher>) -> Self {
        Self::with_backoff(configs, fetcher, BackoffPolicy::default())
    }

    pub fn with_backoff(
        configs: Vec<ProviderConfig>,
        fetcher: Arc<dyn ConditionalFetcher>,
        backoff: BackoffPolicy,
    ) -> Self {
        let mut monitors = Vec::with_capacity(configs.len());
        let mut rejected = Vec::new();
        let mut ids: HashSet<String> = HashSet::new();

        for config in configs {
            let built = if ids.contains(config.provider_id()) {
                Err(MonitorError::config(format!(
                    "duplicate provider id `{}`",
                    config.provider_id()
                )))
            } else {
                ProviderMonitor::new(config.clone(), fetcher.clone())
            };

            match built {
                Ok(m) => {
                    ids.insert(m.provider_id().to_string());
                    monitors.push(m.with_backoff(backoff));
                }
                Err(error) => {
                    tracing::error!(
                        target: "ingest",
                        provider = config.provider_id(),
                        %error,
                        "provider excluded from run"
                    );
                    rejected.push(RejectedProvider { config, error });
                }
            }
        }

        Self { monitors, rejected }
    }

    pub fn rejected(&self) -> &[RejectedProvider] {
        &self.rejected
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.monitors.iter().map(|m| m.provider_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Run every provider as its own task until `token` is cancelled. Returns
    /// the stopped monitors once all tasks have finished.
    pub async fn run(self, sink: EventSink, token: CancellationToken) -> Vec<ProviderMonitor> {
        tracing::info!(target: "ingest", providers = self.monitors.len(), "status monitor starting");

        let mut tasks = JoinSet::new();
        for mut monitor in self.monitors {
            let sink = sink.clone();
            let token = token.clone();
            tasks.spawn(async move {
                monitor.run(&sink, &token).await;
                monitor
            });
        }
        // Only the per-task clones keep the channel open.
        drop(sink);

        let mut stopped = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(monitor) => stopped.push(monitor),
                Err(e) => tracing::error!(target: "ingest", error = %e, "provider task aborted"),
            }
        }

        tracing::info!(target: "ingest", "status monitor stopped");
        stopped
    }

    /// Spawn [`StatusMonitor::run`] in the background.
    pub fn spawn(self, sink: EventSink, token: CancellationToken) -> JoinHandle<Vec<ProviderMonitor>> {
        tokio::spawn(self.run(sink, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::testing::ScriptedFetcher;
    use crate::ingest::types::{FetchResult, MonitorState};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn cfg(url: &str, label: &str) -> ProviderConfig {
        ProviderConfig::new(url, Duration::from_secs(10)).with_label(label)
    }

    #[test]
    fn bad_and_duplicate_configs_are_excluded() {
        let fetcher: Arc<dyn ConditionalFetcher> = Arc::new(ScriptedFetcher::new());
        let monitor = StatusMonitor::new(
            vec![
                cfg("https://a.example.com/feed", "A"),
                cfg("::nope::", "Broken"),
                cfg("https://b.example.com/feed", "A"),
                cfg("https://c.example.com/feed", "C"),
            ],
            fetcher,
        );
        assert_eq!(monitor.provider_ids(), vec!["A", "C"]);
        let rejected: Vec<_> = monitor
            .rejected()
            .iter()
            .map(|r| r.config.feed_url.as_str())
            .collect();
        assert_eq!(rejected, vec!["::nope::", "https://b.example.com/feed"]);
        assert!(monitor.rejected().iter().all(|r| !r.error.is_transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_every_provider() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(
            "https://a.example.com/feed",
            Ok(FetchResult::Unchanged),
        );
        let monitor = StatusMonitor::new(
            vec![
                cfg("https://a.example.com/feed", "A"),
                cfg("https://b.example.com/feed", "B"),
            ],
            fetcher.clone(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let handle = monitor.spawn(tx, token.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        let stopped = handle.await.unwrap();

        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|m| m.state() == MonitorState::Stopped));
        // t=0, 10, 20 for each provider
        assert_eq!(fetcher.request_count("https://a.example.com/feed"), 3);
        assert_eq!(fetcher.request_count("https://b.example.com/feed"), 3);
    }

    #[tokio::test]
    async fn empty_monitor_returns_immediately() {
        let fetcher: Arc<dyn ConditionalFetcher> = Arc::new(ScriptedFetcher::new());
        let monitor = StatusMonitor::new(vec![], fetcher);
        assert!(monitor.is_empty());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stopped = monitor.run(tx, CancellationToken::new()).await;
        assert!(stopped.is_empty());
        // every sender dropped → channel closed
        assert!(rx.recv().await.is_none());
    }
}

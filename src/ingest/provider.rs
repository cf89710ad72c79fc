// src/ingest/provider.rs
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;
use crate::ingest::backoff::BackoffPolicy;
use crate::ingest::fetcher::ConditionalFetcher;
use crate::ingest::parser::parse_feed;
use crate::ingest::store::EventStore;
use crate::ingest::types::{FetchCacheState, FetchResult, MonitorState, PollOutcome, ProviderConfig};
use crate::ingest::{ensure_metrics_described, EventSink};

/// Drives one provider through `Idle → Fetching → Parsing → Filtering → Idle`
/// until cancelled.
///
/// The validators and the seen-id store live here and are touched only by the
/// task running this monitor.
pub struct ProviderMonitor {
    config: ProviderConfig,
    provider_id: String,
    fetcher: Arc<dyn ConditionalFetcher>,
    cache: FetchCacheState,
    store: EventStore,
    state: MonitorState,
    backoff: BackoffPolicy,
    consecutive_failures: u32,
}

/// Reject configs that can never be polled.
pub fn validate_config(config: &ProviderConfig) -> Result<(), MonitorError> {
    let url = reqwest::Url::parse(&config.feed_url)
        .map_err(|e| MonitorError::config(format!("feed url `{}`: {e}", config.feed_url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MonitorError::config(format!(
            "feed url `{}`: unsupported scheme `{}`",
            config.feed_url,
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(MonitorError::config(format!(
            "feed url `{}`: missing host",
            config.feed_url
        )));
    }
    if config.poll_interval.is_zero() {
        return Err(MonitorError::config(format!(
            "provider `{}`: poll interval must be positive",
            config.provider_id()
        )));
    }
    Ok(())
}

impl ProviderMonitor {
    pub fn new(
        config: ProviderConfig,
        fetcher: Arc<dyn ConditionalFetcher>,
    ) -> Result<Self, MonitorError> {
        validate_config(&config)?;
        ensure_metrics_described();
        Ok(Self {
            provider_id: config.provider_id().to_string(),
            config,
            fetcher,
            cache: FetchCacheState::default(),
            store: EventStore::new(),
            state: MonitorState::Idle,
            backoff: BackoffPolicy::default(),
            consecutive_failures: 0,
        })
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn cache_state(&self) -> &FetchCacheState {
        &self.cache
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One full tick. Errors are transient: the monitor is back in `Idle` with
    /// its validators and seen ids untouched.
    pub async fn poll_once(&mut self, sink: &EventSink) -> Result<PollOutcome, MonitorError> {
        counter!("status_polls_total", "provider" => self.provider_id.clone()).increment(1);

        let result = self.cycle(sink).await;
        self.state = MonitorState::Idle;

        match &result {
            Ok(_) => self.consecutive_failures = 0,
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                counter!(
                    "status_poll_errors_total",
                    "provider" => self.provider_id.clone(),
                    "kind" => e.kind()
                )
                .increment(1);
            }
        }
        result
    }

    async fn cycle(&mut self, sink: &EventSink) -> Result<PollOutcome, MonitorError> {
        self.state = MonitorState::Fetching;
        let fetched = self
            .fetcher
            .fetch(&self.provider_id, &self.config.feed_url, &self.cache)
            .await?;

        let (payload, etag, last_modified) = match fetched {
            FetchResult::Unchanged => {
                counter!("status_poll_unchanged_total", "provider" => self.provider_id.clone())
                    .increment(1);
                return Ok(PollOutcome::Unchanged);
            }
            FetchResult::Changed {
                payload,
                etag,
                last_modified,
            } => (payload, etag, last_modified),
        };

        self.state = MonitorState::Parsing;
        let events = parse_feed(&self.provider_id, &payload)?;
        // A payload that failed to parse must be fetched again, so validators
        // are committed only here.
        self.cache = FetchCacheState {
            etag,
            last_modified,
        };

        self.state = MonitorState::Filtering;
        let baseline = self.store.is_first_poll(&self.provider_id);
        let fresh = self.store.filter_new(&self.provider_id, events);
        gauge!("status_seen_entries", "provider" => self.provider_id.clone())
            .set(self.store.seen_count(&self.provider_id) as f64);

        if baseline {
            tracing::info!(
                target: "ingest",
                provider = %self.provider_id,
                recorded = fresh.len(),
                "baseline established"
            );
            return Ok(PollOutcome::Baseline {
                recorded: fresh.len(),
            });
        }

        let mut count = 0usize;
        for ev in fresh {
            if sink.send(ev).is_err() {
                tracing::warn!(target: "ingest", provider = %self.provider_id, "event sink closed");
                break;
            }
            count += 1;
        }
        counter!("status_events_emitted_total", "provider" => self.provider_id.clone())
            .increment(count as u64);

        Ok(PollOutcome::Emitted { count })
    }

    /// Poll immediately, then once per interval, until `token` fires.
    /// Cancellation is honoured while sleeping and while a request is in
    /// flight; the request future is dropped with its connection.
    pub async fn run(&mut self, sink: &EventSink, token: &CancellationToken) {
        tracing::info!(
            target: "ingest",
            provider = %self.provider_id,
            url = %self.config.feed_url,
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "provider monitor started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = self.poll_once(sink) => res,
            };

            match outcome {
                Ok(PollOutcome::Emitted { count }) if count > 0 => {
                    tracing::info!(target: "ingest", provider = %self.provider_id, count, "new status events");
                }
                Ok(outcome) => {
                    tracing::debug!(target: "ingest", provider = %self.provider_id, ?outcome, "poll finished");
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        provider = %self.provider_id,
                        kind = e.kind(),
                        failures = self.consecutive_failures,
                        error = %e,
                        "poll failed; retrying next tick"
                    );
                }
            }

            let delay = self
                .backoff
                .next_delay(self.config.poll_interval, self.consecutive_failures);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state = MonitorState::Stopped;
        tracing::info!(target: "ingest", provider = %self.provider_id, "provider monitor stopped");
    }
}

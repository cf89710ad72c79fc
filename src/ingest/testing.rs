// src/ingest/testing.rs
//! In-memory [`ConditionalFetcher`] for driving monitors without a network.
//!
//! Compiled for this crate's own tests and behind the `test-util` feature
//! (on by default). Builds that ship only the binary can turn it off with
//! `default-features = false`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MonitorError;
use crate::ingest::fetcher::ConditionalFetcher;
use crate::ingest::types::{FetchCacheState, FetchResult};

/// Fetcher that replays queued results per URL and records every request.
/// An exhausted queue answers `Unchanged`.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<FetchResult, MonitorError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<(String, FetchCacheState)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, result: Result<FetchResult, MonitorError>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_feed(&self, url: &str, payload: &str, etag: Option<&str>) {
        self.push(
            url,
            Ok(FetchResult::Changed {
                payload: payload.to_string(),
                etag: etag.map(ToString::to_string),
                last_modified: None,
            }),
        );
    }

    /// Every fetch for `url` sleeps this long before answering.
    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), delay);
    }

    pub fn requests(&self) -> Vec<(String, FetchCacheState)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }
}

#[async_trait]
impl ConditionalFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _provider_id: &str,
        url: &str,
        cache: &FetchCacheState,
    ) -> Result<FetchResult, MonitorError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((url.to_string(), cache.clone()));

        let delay = self
            .delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(FetchResult::Unchanged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_reports_unchanged() {
        let f = ScriptedFetcher::new();
        f.push_feed("u", "<feed/>", Some("e1"));
        let first = f.fetch("p", "u", &FetchCacheState::default()).await.unwrap();
        assert!(matches!(first, FetchResult::Changed { .. }));
        let second = f.fetch("p", "u", &FetchCacheState::default()).await.unwrap();
        assert_eq!(second, FetchResult::Unchanged);
        assert_eq!(f.request_count("u"), 2);
        assert_eq!(f.request_count("other"), 0);
    }

    #[tokio::test]
    async fn records_the_validators_it_was_given() {
        let f = ScriptedFetcher::new();
        let cache = FetchCacheState {
            etag: Some("\"v3\"".into()),
            last_modified: None,
        };
        f.fetch("p", "u", &cache).await.unwrap();
        assert_eq!(f.requests(), vec![("u".to_string(), cache)]);
    }
}

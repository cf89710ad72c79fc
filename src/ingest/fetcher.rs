// src/ingest/fetcher.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;

use crate::error::MonitorError;
use crate::ingest::types::{FetchCacheState, FetchResult};

pub const DEFAULT_USER_AGENT: &str = concat!("status-watch/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Performs one conditional GET. Implementations keep no per-provider state;
/// the caller owns the validators.
#[async_trait]
pub trait ConditionalFetcher: Send + Sync {
    async fn fetch(
        &self,
        provider_id: &str,
        url: &str,
        cache: &FetchCacheState,
    ) -> Result<FetchResult, MonitorError>;
}

/// reqwest-backed fetcher. One instance (and one connection pool) is shared by
/// all providers.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, MonitorError> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| MonitorError::config(format!("building http client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, provider_id: &str, err: reqwest::Error) -> MonitorError {
        if err.is_timeout() {
            MonitorError::Timeout {
                provider: provider_id.to_string(),
                after: self.timeout,
            }
        } else {
            MonitorError::network(provider_id, err.to_string())
        }
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl ConditionalFetcher for HttpFetcher {
    async fn fetch(
        &self,
        provider_id: &str,
        url: &str,
        cache: &FetchCacheState,
    ) -> Result<FetchResult, MonitorError> {
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(etag) = cache.etag.as_deref() {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = cache.last_modified.as_deref() {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(provider_id, e))?;

        let status = response.status();
        tracing::debug!(target: "ingest", provider = provider_id, status = status.as_u16(), "feed response");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::Unchanged);
        }
        if !status.is_success() {
            return Err(MonitorError::http_status(provider_id, status.as_u16()));
        }

        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);
        let payload = response
            .text()
            .await
            .map_err(|e| self.classify(provider_id, e))?;

        Ok(FetchResult::Changed {
            payload,
            etag,
            last_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FEED_ETAG: &str = "\"status-v1\"";
    const FEED_LAST_MODIFIED: &str = "Tue, 24 Feb 2026 10:00:00 GMT";
    const FEED_BODY: &str = "<?xml version=\"1.0\"?><feed></feed>";

    #[derive(Clone)]
    struct ServerState {
        hits: Arc<AtomicUsize>,
    }

    async fn etag_feed(State(state): State<ServerState>, headers: HeaderMap) -> Response {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if headers
            .get(IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            == Some(FEED_ETAG)
        {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        (
            StatusCode::OK,
            [(ETAG, FEED_ETAG), (LAST_MODIFIED, FEED_LAST_MODIFIED)],
            FEED_BODY,
        )
            .into_response()
    }

    async fn last_modified_feed(headers: HeaderMap) -> Response {
        if headers
            .get(IF_MODIFIED_SINCE)
            .and_then(|value| value.to_str().ok())
            == Some(FEED_LAST_MODIFIED)
        {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        (StatusCode::OK, [(LAST_MODIFIED, FEED_LAST_MODIFIED)], FEED_BODY).into_response()
    }

    async fn failing_feed() -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, "temporary failure").into_response()
    }

    async fn slow_feed() -> Response {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (StatusCode::OK, FEED_BODY).into_response()
    }

    async fn spawn_test_server() -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = ServerState { hits: hits.clone() };
        let app = Router::new()
            .route("/etag.atom", get(etag_feed))
            .route("/last-modified.atom", get(last_modified_feed))
            .route("/failing.atom", get(failing_feed))
            .route("/slow.atom", get(slow_feed))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        let join_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });
        (format!("http://{address}"), hits, join_handle)
    }

    #[tokio::test]
    async fn etag_round_trip_yields_unchanged() {
        let (base, hits, server) = spawn_test_server().await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{base}/etag.atom");

        let first = fetcher
            .fetch("test", &url, &FetchCacheState::default())
            .await
            .expect("first fetch");
        let cache = match first {
            FetchResult::Changed {
                payload,
                etag,
                last_modified,
            } => {
                assert_eq!(payload, FEED_BODY);
                assert_eq!(etag.as_deref(), Some(FEED_ETAG));
                assert_eq!(last_modified.as_deref(), Some(FEED_LAST_MODIFIED));
                FetchCacheState {
                    etag,
                    last_modified,
                }
            }
            FetchResult::Unchanged => panic!("first fetch must carry a payload"),
        };

        let second = fetcher.fetch("test", &url, &cache).await.expect("second fetch");
        assert_eq!(second, FetchResult::Unchanged);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        server.abort();
    }

    #[tokio::test]
    async fn last_modified_alone_is_sent() {
        let (base, _hits, server) = spawn_test_server().await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let cache = FetchCacheState {
            etag: None,
            last_modified: Some(FEED_LAST_MODIFIED.to_string()),
        };
        let res = fetcher
            .fetch("test", &format!("{base}/last-modified.atom"), &cache)
            .await
            .expect("fetch");
        assert_eq!(res, FetchResult::Unchanged);
        server.abort();
    }

    #[tokio::test]
    async fn non_success_status_is_network_error() {
        let (base, _hits, server) = spawn_test_server().await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch("test", &format!("{base}/failing.atom"), &FetchCacheState::default())
            .await
            .expect_err("503 must fail");
        assert!(matches!(err, MonitorError::Network { status: Some(503), .. }));
        server.abort();
    }

    #[tokio::test]
    async fn slow_server_hits_deadline() {
        let (base, _hits, server) = spawn_test_server().await;
        let fetcher = HttpFetcher::new(Duration::from_millis(100)).unwrap();
        let err = fetcher
            .fetch("test", &format!("{base}/slow.atom"), &FetchCacheState::default())
            .await
            .expect_err("must time out");
        assert!(matches!(err, MonitorError::Timeout { .. }), "got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let err = fetcher
            .fetch("test", &format!("http://{address}/feed"), &FetchCacheState::default())
            .await
            .expect_err("nothing listens");
        assert_eq!(err.kind(), "network");
    }
}

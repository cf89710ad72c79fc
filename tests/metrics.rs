// tests/metrics.rs
//
// Own test binary, so installing the global recorder here is safe.

use std::sync::Arc;
use std::time::Duration;

use status_watch::ingest::testing::ScriptedFetcher;
use status_watch::ingest::{ProviderConfig, ProviderMonitor};
use status_watch::metrics::Metrics;
use status_watch::MonitorError;
use tokio::sync::mpsc;

const URL: &str = "https://status.example.com/history.atom";

#[tokio::test]
async fn poll_series_are_exposed() {
    let metrics = Metrics::init().expect("recorder");

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_feed(
        URL,
        r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><id>a</id><title>x</title></entry></feed>"#,
        None,
    );
    fetcher.push(URL, Err(MonitorError::network("m", "refused")));

    let mut m = ProviderMonitor::new(
        ProviderConfig::new(URL, Duration::from_secs(60)).with_label("m"),
        fetcher,
    )
    .unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    m.poll_once(&tx).await.unwrap();
    m.poll_once(&tx).await.unwrap_err();
    m.poll_once(&tx).await.unwrap();

    let out = metrics.handle.render();
    assert!(out.contains("status_polls_total"));
    assert!(out.contains("status_poll_errors_total"));
    assert!(out.contains("kind=\"network\""));
    assert!(out.contains("status_poll_unchanged_total"));
    assert!(out.contains("status_seen_entries"));
    assert!(out.contains("status_parse_ms"));
}

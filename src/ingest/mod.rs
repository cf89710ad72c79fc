// src/ingest/mod.rs
pub mod backoff;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod provider;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

pub use fetcher::{ConditionalFetcher, HttpFetcher};
pub use provider::ProviderMonitor;
pub use scheduler::StatusMonitor;
pub use store::EventStore;
pub use types::{FetchCacheState, FetchResult, MonitorState, PollOutcome, ProviderConfig, StatusEvent};

/// Channel half that receives every emitted event.
pub type EventSink = tokio::sync::mpsc::UnboundedSender<StatusEvent>;

const MAX_TEXT_CHARS: usize = 1500;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("status_polls_total", "Poll ticks started, per provider.");
        describe_counter!(
            "status_poll_unchanged_total",
            "Polls answered with 304 Not Modified."
        );
        describe_counter!(
            "status_poll_errors_total",
            "Failed polls by provider and error kind."
        );
        describe_counter!(
            "status_events_emitted_total",
            "New status events forwarded to the sink."
        );
        describe_gauge!(
            "status_seen_entries",
            "Entry ids remembered per provider."
        );
        describe_histogram!("status_parse_ms", "Feed parse time in milliseconds.");
    });
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Turn an HTML fragment into a single line of plain text.
pub fn normalize_text(s: &str) -> String {
    // Entities first so escaped markup is stripped as well
    let decoded = html_escape::decode_html_entities(s);

    // Tags become spaces: "<p>a</p><p>b</p>" must not glue "ab"
    let mut out = re_tags().replace_all(&decoded, " ").into_owned();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out = re_ws().replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

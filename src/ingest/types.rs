// src/ingest/types.rs
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// One normalized status update taken from a feed entry.
///
/// Identity is `entry_id` alone: two events with the same id are the same
/// update even when their text differs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StatusEvent {
    pub provider_id: String,
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub product: Vec<String>,
    pub status_message: String,
    pub link: Option<String>,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] Product: {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.provider_id,
            self.product.join(", ")
        )?;
        write!(f, "Status: {}", self.status_message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProviderConfig {
    pub feed_url: String,
    pub poll_interval: Duration,
    pub label: Option<String>,
}

impl ProviderConfig {
    pub fn new(feed_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            feed_url: feed_url.into(),
            poll_interval,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label when configured, otherwise the feed URL.
    pub fn provider_id(&self) -> &str {
        match self.label.as_deref().map(str::trim) {
            Some(l) if !l.is_empty() => l,
            _ => &self.feed_url,
        }
    }
}

/// Conditional-request validators remembered between polls of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCacheState {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FetchCacheState {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Server answered 304; nothing to parse.
    Unchanged,
    Changed {
        payload: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

/// Where a provider currently is in its poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MonitorState {
    Idle,
    Fetching,
    Parsing,
    Filtering,
    Stopped,
}

/// Result of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    /// First successful poll: entries recorded, none emitted.
    Baseline { recorded: usize },
    Emitted { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn provider_id_prefers_non_blank_label() {
        let cfg = ProviderConfig::new("https://status.example.com/feed", Duration::from_secs(5));
        assert_eq!(cfg.provider_id(), "https://status.example.com/feed");
        assert_eq!(cfg.clone().with_label("Example").provider_id(), "Example");
        assert_eq!(
            cfg.with_label("  ").provider_id(),
            "https://status.example.com/feed"
        );
    }

    #[test]
    fn display_renders_product_and_status_lines() {
        let ev = StatusEvent {
            provider_id: "OpenAI".into(),
            entry_id: "x".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            product: vec!["Chat".into(), "API".into()],
            status_message: "Resolved".into(),
            link: None,
        };
        assert_eq!(
            ev.to_string(),
            "[2025-03-01 12:30:00] Product: OpenAI - Chat, API\nStatus: Resolved"
        );
    }
}

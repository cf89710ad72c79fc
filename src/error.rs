// src/error.rs
use std::time::Duration;

/// Errors produced while constructing or polling a provider.
///
/// `Config` is fatal for the provider it concerns (it never enters the
/// polling cycle). The other kinds are transient: the tick is counted as
/// failed and the provider polls again on its next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("invalid provider configuration: {reason}")]
    Config { reason: String },

    #[error("[{provider}] network error: {reason}")]
    Network {
        provider: String,
        reason: String,
        status: Option<u16>,
    },

    #[error("[{provider}] request timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("[{provider}] feed parse error: {reason}")]
    Parse { provider: String, reason: String },
}

impl MonitorError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn network(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
            reason: reason.into(),
            status: None,
        }
    }

    pub fn http_status(provider: impl Into<String>, status: u16) -> Self {
        Self::Network {
            provider: provider.into(),
            reason: format!("unexpected status code {status}"),
            status: Some(status),
        }
    }

    pub fn parse(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Transient errors are retried on the next tick.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config { .. })
    }

    /// Short label used for the `kind` metric dimension and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse",
        }
    }
}

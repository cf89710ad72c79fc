// src/ingest/backoff.rs
use std::time::Duration;

/// Optional stretching of the poll interval after consecutive transient
/// failures. Disabled by default: a failed tick is simply retried on the
/// next regular tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub enabled: bool,
    /// Upper bound for the stretched delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_delay_secs: 900,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next poll given how many ticks in a row have failed.
    ///
    /// `interval * 2^failures`, capped at `max_delay_secs` but never below
    /// `interval`.
    pub fn next_delay(&self, interval: Duration, consecutive_failures: u32) -> Duration {
        if !self.enabled || consecutive_failures == 0 {
            return interval;
        }
        // checked_shl saturates shifts >= 32
        let multiplier = 1u32
            .checked_shl(consecutive_failures)
            .unwrap_or(u32::MAX);
        let cap = Duration::from_secs(self.max_delay_secs).max(interval);
        interval.checked_mul(multiplier).unwrap_or(cap).min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_keeps_interval() {
        let p = BackoffPolicy::default();
        assert_eq!(p.next_delay(Duration::from_secs(60), 5), Duration::from_secs(60));
    }

    #[test]
    fn enabled_policy_doubles_and_caps() {
        let p = BackoffPolicy {
            enabled: true,
            max_delay_secs: 300,
        };
        let i = Duration::from_secs(60);
        assert_eq!(p.next_delay(i, 0), i);
        assert_eq!(p.next_delay(i, 1), Duration::from_secs(120));
        assert_eq!(p.next_delay(i, 2), Duration::from_secs(240));
        assert_eq!(p.next_delay(i, 3), Duration::from_secs(300));
        assert_eq!(p.next_delay(i, 40), Duration::from_secs(300));
    }

    #[test]
    fn cap_below_interval_never_shortens_polling() {
        let p = BackoffPolicy {
            enabled: true,
            max_delay_secs: 1,
        };
        assert_eq!(p.next_delay(Duration::from_secs(30), 3), Duration::from_secs(30));
    }
}

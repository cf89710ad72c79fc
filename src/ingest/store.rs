// src/ingest/store.rs
use std::collections::{HashMap, HashSet};

use crate::ingest::types::StatusEvent;

/// Entry ids already seen for one provider, plus whether the baseline poll
/// has happened.
#[derive(Debug, Default, Clone)]
struct SeenSet {
    ids: HashSet<String>,
    baselined: bool,
}

/// In-memory record of emitted entry ids, keyed by provider.
///
/// Never pruned and never persisted: a restart re-baselines every provider.
/// Each `ProviderMonitor` owns its own store, so no locking is involved.
#[derive(Debug, Default, Clone)]
pub struct EventStore {
    providers: HashMap<String, SeenSet>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first `filter_new` call for this provider.
    pub fn is_first_poll(&self, provider_id: &str) -> bool {
        self.providers
            .get(provider_id)
            .is_none_or(|seen| !seen.baselined)
    }

    /// Events whose id was not seen before, in input order. Every input id is
    /// recorded, so an id repeated within `events` comes out at most once.
    pub fn filter_new(&mut self, provider_id: &str, events: Vec<StatusEvent>) -> Vec<StatusEvent> {
        let seen = self.providers.entry(provider_id.to_string()).or_default();
        seen.baselined = true;
        events
            .into_iter()
            .filter(|ev| seen.ids.insert(ev.entry_id.clone()))
            .collect()
    }

    pub fn seen_count(&self, provider_id: &str) -> usize {
        self.providers
            .get(provider_id)
            .map_or(0, |seen| seen.ids.len())
    }

    pub fn contains(&self, provider_id: &str, entry_id: &str) -> bool {
        self.providers
            .get(provider_id)
            .is_some_and(|seen| seen.ids.contains(entry_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ev(id: &str, ts: i64) -> StatusEvent {
        StatusEvent {
            provider_id: "p".into(),
            entry_id: id.into(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            product: vec!["API".into()],
            status_message: format!("update {id}"),
            link: None,
        }
    }

    #[test]
    fn first_poll_flag_flips_once() {
        let mut store = EventStore::new();
        assert!(store.is_first_poll("p"));
        store.filter_new("p", vec![]);
        assert!(!store.is_first_poll("p"));
        // empty first poll still counts as the baseline
        assert_eq!(store.seen_count("p"), 0);
        assert!(store.is_first_poll("other"));
    }

    #[test]
    fn filter_new_keeps_order_and_records_everything() {
        let mut store = EventStore::new();
        let first = store.filter_new("p", vec![ev("b", 20), ev("a", 10)]);
        assert_eq!(first.len(), 2);

        let second = store.filter_new("p", vec![ev("d", 40), ev("c", 30), ev("b", 20)]);
        let ids: Vec<_> = second.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c"]);
        assert_eq!(store.seen_count("p"), 4);
        assert!(store.contains("p", "a"));
    }

    #[test]
    fn identity_is_by_id_not_text() {
        let mut store = EventStore::new();
        store.filter_new("p", vec![ev("a", 10)]);
        let mut edited = ev("a", 10);
        edited.status_message = "update  a ".into();
        assert!(store.filter_new("p", vec![edited]).is_empty());
    }

    #[test]
    fn repeated_id_in_one_batch_is_emitted_once() {
        let mut store = EventStore::new();
        let out = store.filter_new("p", vec![ev("x", 2), ev("x", 1)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp.timestamp(), 2);
    }

    #[test]
    fn providers_do_not_share_ids() {
        let mut store = EventStore::new();
        store.filter_new("a", vec![ev("1", 1)]);
        assert!(!store.contains("b", "1"));
        assert_eq!(store.filter_new("b", vec![ev("1", 1)]).len(), 1);
    }
}

//! Bounded in-memory list of recently emitted events for `/events`.
//! Not used for dedup; that is `ingest::store`.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::ingest::types::StatusEvent;

#[derive(Debug)]
pub struct EventHistory {
    inner: Mutex<VecDeque<StatusEvent>>,
    cap: usize,
}

impl EventHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, ev: StatusEvent) {
        let mut v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.push_back(ev);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Up to `n` events, most recently emitted first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<StatusEvent> {
        let v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }
}

//! Virtual-clock timer registry.
//!
//! Components that would reach for `setTimeout` in the browser schedule an
//! entry here instead; the driver polls `next_deadline` and feeds due timers
//! back. Teardown clears the queue, so a leaked timer shows up as a non-empty
//! queue in tests rather than a stray DOM mutation.
use std::collections::BTreeMap;

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    next_id: u64,
    entries: BTreeMap<(u64, TimerId), K>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Clone + PartialEq> TimerQueue<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at_ms: u64, kind: K) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert((at_ms, id), kind);
        id
    }

    /// Cancel a single timer. Returns `true` when it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let key = self.entries.keys().find(|(_, entry)| *entry == id).copied();
        key.is_some_and(|key| self.entries.remove(&key).is_some())
    }

    /// Cancel every pending timer of the given kind.
    pub fn cancel_kind(&mut self, kind: &K) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, pending| pending != kind);
        before - self.entries.len()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    /// Remove and return the earliest timer due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(u64, K)> {
        let (&(at, id), _) = self.entries.iter().next()?;
        if at > now_ms {
            return None;
        }
        self.entries.remove(&(at, id)).map(|kind| (at, kind))
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    #[must_use]
    pub fn contains_kind(&self, kind: &K) -> bool {
        self.entries.values().any(|pending| pending == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Tick,
        Hold,
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(300, Kind::Hold);
        queue.schedule(100, Kind::Tick);
        assert_eq!(queue.next_deadline(), Some(100));
        assert_eq!(queue.pop_due(50), None);
        assert_eq!(queue.pop_due(400), Some((100, Kind::Tick)));
        assert_eq!(queue.pop_due(400), Some((300, Kind::Hold)));
        assert!(queue.is_empty());
    }

    #[test]
    fn cancellation_by_id_and_kind() {
        let mut queue = TimerQueue::new();
        let tick = queue.schedule(10, Kind::Tick);
        queue.schedule(20, Kind::Hold);
        queue.schedule(30, Kind::Hold);
        assert!(queue.cancel(tick));
        assert!(!queue.cancel(tick));
        assert_eq!(queue.cancel_kind(&Kind::Hold), 2);
        assert!(queue.is_empty());
    }
}

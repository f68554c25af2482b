//! Virtual-time one-shot timers.
//!
//! Every simulator owns a `TimerSet` keyed by its own timer-kind enum. The
//! engine asks each set for `next_due()` and fires the globally earliest one,
//! so all timers interleave on a single cooperative loop.
//!
//! `clear()` drops every pending timer and advances the epoch. A `TimerId`
//! handed out before the clear can no longer cancel or match anything, which
//! is what makes a reset deterministic: nothing armed before it can fire
//! after it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Milliseconds on the engine's virtual clock.
pub type Millis = u64;

/// Handle to one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    epoch: u64,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Entry<K> {
    due: Millis,
    seq: u64,
    kind: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    // Reversed so the BinaryHeap pops the earliest (due, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-ordered set of pending one-shot timers.
#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    heap: BinaryHeap<Entry<K>>,
    cancelled: HashSet<u64>,
    epoch: u64,
    next_seq: u64,
}

impl<K: Copy + PartialEq> TimerSet<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            epoch: 0,
            next_seq: 0,
        }
    }

    /// Arm a timer that becomes due at `due`.
    pub fn arm(&mut self, kind: K, due: Millis) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { due, seq, kind });
        TimerId {
            epoch: self.epoch,
            seq,
        }
    }

    /// Cancel one timer. Returns false if it already fired, was cancelled,
    /// or belongs to an earlier epoch.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if id.epoch != self.epoch {
            return false;
        }
        let pending = self
            .heap
            .iter()
            .any(|e| e.seq == id.seq && !self.cancelled.contains(&e.seq));
        if pending {
            self.cancelled.insert(id.seq);
        }
        pending
    }

    /// Cancel every pending timer of one kind.
    pub fn cancel_kind(&mut self, kind: K) {
        let seqs: Vec<u64> = self
            .heap
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.seq)
            .collect();
        self.cancelled.extend(seqs);
    }

    /// Whether a live timer of this kind is pending.
    pub fn is_armed(&self, kind: K) -> bool {
        self.heap
            .iter()
            .any(|e| e.kind == kind && !self.cancelled.contains(&e.seq))
    }

    /// Drop everything and start a new epoch.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
        self.epoch += 1;
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&mut self) -> Option<Millis> {
        self.discard_cancelled_head();
        self.heap.peek().map(|e| e.due)
    }

    /// Pop the earliest live timer if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<(Millis, K)> {
        self.discard_cancelled_head();
        match self.heap.peek() {
            Some(head) if head.due <= now => {
                let entry = self.heap.pop()?;
                Some((entry.due, entry.kind))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn discard_cancelled_head(&mut self) {
        while let Some(head) = self.heap.peek() {
            if self.cancelled.remove(&head.seq) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

impl<K: Copy + PartialEq> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Tick,
        Deadline(u32),
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut timers = TimerSet::new();
        timers.arm(Kind::Tick, 300);
        timers.arm(Kind::Deadline(1), 100);
        timers.arm(Kind::Deadline(2), 200);

        assert_eq!(timers.next_due(), Some(100));
        assert_eq!(timers.pop_due(50), None);
        assert_eq!(timers.pop_due(250), Some((100, Kind::Deadline(1))));
        assert_eq!(timers.pop_due(250), Some((200, Kind::Deadline(2))));
        assert_eq!(timers.pop_due(250), None);
        assert_eq!(timers.pop_due(300), Some((300, Kind::Tick)));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_ties_fire_in_arming_order() {
        let mut timers = TimerSet::new();
        timers.arm(Kind::Deadline(1), 100);
        timers.arm(Kind::Deadline(2), 100);
        timers.arm(Kind::Deadline(3), 100);

        let order: Vec<Kind> = std::iter::from_fn(|| timers.pop_due(100).map(|(_, k)| k)).collect();
        assert_eq!(
            order,
            vec![Kind::Deadline(1), Kind::Deadline(2), Kind::Deadline(3)]
        );
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerSet::new();
        let a = timers.arm(Kind::Deadline(1), 100);
        timers.arm(Kind::Tick, 200);

        assert!(timers.cancel(a));
        assert!(!timers.cancel(a));
        assert_eq!(timers.next_due(), Some(200));
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_cancel_kind() {
        let mut timers = TimerSet::new();
        timers.arm(Kind::Tick, 100);
        timers.arm(Kind::Tick, 150);
        timers.arm(Kind::Deadline(7), 120);

        timers.cancel_kind(Kind::Tick);
        assert!(!timers.is_armed(Kind::Tick));
        assert!(timers.is_armed(Kind::Deadline(7)));
        assert_eq!(timers.pop_due(1_000), Some((120, Kind::Deadline(7))));
        assert_eq!(timers.pop_due(1_000), None);
    }

    #[test]
    fn test_clear_invalidates_old_handles() {
        let mut timers = TimerSet::new();
        let stale = timers.arm(Kind::Deadline(1), 100);
        timers.clear();

        assert_eq!(timers.next_due(), None);
        timers.arm(Kind::Deadline(1), 100);
        // A handle from before the clear must not touch the new timer.
        assert!(!timers.cancel(stale));
        assert_eq!(timers.pop_due(100), Some((100, Kind::Deadline(1))));
    }
}

// Overflow tiers for records the MPMC ring refuses.
//
// Two tiers sit behind the MPMC ring: a small spill ring owned by each
// producing thread, and one unbounded mutex-guarded queue shared by all
// producers. The owning thread is both writer and reader of its spill ring,
// so the ring needs no synchronization; the fallback queue is the only place
// a producer may take a lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::entry::LogEntry;

/// Slots in each per-thread spill ring. One slot is sacrificed to tell full
/// from empty.
pub(crate) const OVERFLOW_RING_SLOTS: usize = 64;

/// Fixed-capacity ring owned by a single producing thread.
pub(crate) struct OverflowRing {
    buf: [Option<LogEntry>; OVERFLOW_RING_SLOTS],
    head: usize,
    tail: usize,
}

impl OverflowRing {
    pub fn new() -> Self {
        Self {
            buf: std::array::from_fn(|_| None),
            head: 0,
            tail: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn try_push(&mut self, entry: LogEntry) -> Result<(), LogEntry> {
        let next = (self.tail + 1) % OVERFLOW_RING_SLOTS;
        if next == self.head {
            return Err(entry);
        }
        self.buf[self.tail] = Some(entry);
        self.tail = next;
        Ok(())
    }

    pub fn try_pop(&mut self) -> Option<LogEntry> {
        if self.head == self.tail {
            return None;
        }
        let entry = self.buf[self.head].take();
        self.head = (self.head + 1) % OVERFLOW_RING_SLOTS;
        entry
    }

    /// Undo the most recent `try_pop`, restoring `entry` as the next record
    /// to pop. Drain attempts must be atomic: a popped record that fails to
    /// enter the MPMC ring stays at the front.
    pub fn rollback_last_pop(&mut self, entry: LogEntry) {
        self.head = (self.head + OVERFLOW_RING_SLOTS - 1) % OVERFLOW_RING_SLOTS;
        self.buf[self.head] = Some(entry);
    }
}

/// Unbounded queue of last resort, shared by all producers, drained only by
/// the flusher. `len` mirrors the queue length so the produce fast path can
/// check for pending spill without taking the mutex.
pub(crate) struct FallbackQueue {
    inner: Mutex<VecDeque<LogEntry>>,
    len: AtomicUsize,
}

impl FallbackQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        // a producer that panicked while logging must not wedge the flusher
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, entry: LogEntry) {
        let mut queue = self.lock();
        queue.push_back(entry);
        self.len.store(queue.len(), Ordering::Release);
    }

    /// Move a thread's entire spill ring here, then append `entry`, all under
    /// one lock acquisition so the thread's records stay contiguous.
    pub fn spill(&self, ring: &mut OverflowRing, entry: LogEntry) {
        let mut queue = self.lock();
        while let Some(spilled) = ring.try_pop() {
            queue.push_back(spilled);
        }
        queue.push_back(entry);
        self.len.store(queue.len(), Ordering::Release);
    }

    /// Move a thread's entire spill ring here, preserving its order. Used
    /// when a producing thread exits or switches loggers while records are
    /// still parked in its ring.
    pub fn spill_ring(&self, ring: &mut OverflowRing) {
        let mut queue = self.lock();
        while let Some(spilled) = ring.try_pop() {
            queue.push_back(spilled);
        }
        self.len.store(queue.len(), Ordering::Release);
    }

    /// Move up to `limit` records into `out`; returns the number moved.
    pub fn dequeue_bulk(&self, out: &mut Vec<LogEntry>, limit: usize) -> usize {
        let mut queue = self.lock();
        let mut moved = 0;
        while moved < limit {
            match queue.pop_front() {
                Some(entry) => {
                    out.push(entry);
                    moved += 1;
                }
                None => break,
            }
        }
        self.len.store(queue.len(), Ordering::Release);
        moved
    }

    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Level;

    fn entry(msg: &str) -> LogEntry {
        LogEntry {
            seq: 0,
            ts_ms: 0,
            thread_id: 1,
            level: Level::Info,
            msg: msg.to_string(),
        }
    }

    #[test]
    fn test_ring_push_pop_fifo() {
        let mut ring = OverflowRing::new();
        assert!(ring.is_empty());

        ring.try_push(entry("a")).unwrap();
        ring.try_push(entry("b")).unwrap();
        assert!(!ring.is_empty());

        assert_eq!(ring.try_pop().unwrap().msg, "a");
        assert_eq!(ring.try_pop().unwrap().msg, "b");
        assert!(ring.try_pop().is_none());
    }

    #[test]
    fn test_ring_capacity_is_slots_minus_one() {
        let mut ring = OverflowRing::new();
        for i in 0..OVERFLOW_RING_SLOTS - 1 {
            ring.try_push(entry(&format!("{}", i))).unwrap();
        }
        assert!(ring.try_push(entry("over")).is_err());
    }

    #[test]
    fn test_ring_wraparound() {
        let mut ring = OverflowRing::new();
        for lap in 0..3 {
            for i in 0..OVERFLOW_RING_SLOTS - 1 {
                ring.try_push(entry(&format!("l{}i{}", lap, i))).unwrap();
            }
            for i in 0..OVERFLOW_RING_SLOTS - 1 {
                assert_eq!(ring.try_pop().unwrap().msg, format!("l{}i{}", lap, i));
            }
        }
    }

    #[test]
    fn test_ring_rollback_restores_front() {
        let mut ring = OverflowRing::new();
        ring.try_push(entry("first")).unwrap();
        ring.try_push(entry("second")).unwrap();

        let popped = ring.try_pop().unwrap();
        assert_eq!(popped.msg, "first");
        ring.rollback_last_pop(popped);

        assert_eq!(ring.try_pop().unwrap().msg, "first");
        assert_eq!(ring.try_pop().unwrap().msg, "second");
    }

    #[test]
    fn test_fallback_fifo_and_len() {
        let queue = FallbackQueue::new();
        assert!(queue.is_empty());

        queue.enqueue(entry("x"));
        queue.enqueue(entry("y"));
        assert!(!queue.is_empty());

        let mut out = Vec::new();
        assert_eq!(queue.dequeue_bulk(&mut out, 1), 1);
        assert_eq!(out[0].msg, "x");
        assert!(!queue.is_empty());

        assert_eq!(queue.dequeue_bulk(&mut out, 10), 1);
        assert_eq!(out[1].msg, "y");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_spill_ring_without_entry() {
        let queue = FallbackQueue::new();
        let mut ring = OverflowRing::new();
        ring.try_push(entry("a")).unwrap();
        ring.try_push(entry("b")).unwrap();

        queue.spill_ring(&mut ring);
        assert!(ring.is_empty());

        let mut out = Vec::new();
        queue.dequeue_bulk(&mut out, 10);
        let msgs: Vec<&str> = out.iter().map(|e| e.msg.as_str()).collect();
        assert_eq!(msgs, ["a", "b"]);
    }

    #[test]
    fn test_spill_keeps_ring_order_and_appends() {
        let queue = FallbackQueue::new();
        queue.enqueue(entry("older"));

        let mut ring = OverflowRing::new();
        ring.try_push(entry("r0")).unwrap();
        ring.try_push(entry("r1")).unwrap();

        queue.spill(&mut ring, entry("newest"));
        assert!(ring.is_empty());

        let mut out = Vec::new();
        queue.dequeue_bulk(&mut out, 10);
        let msgs: Vec<&str> = out.iter().map(|e| e.msg.as_str()).collect();
        assert_eq!(msgs, ["older", "r0", "r1", "newest"]);
    }
}

// Bounded MPMC ring carrying log records from producers to the flusher.
//
// Per-cell sequence numbers coordinate producers and the consumer without
// locks: a cell whose sequence equals the claimed position is free for a
// producer, a cell whose sequence equals position + 1 holds a record for the
// consumer. Capacity is a power of two so positions map to cells with a mask.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::entry::LogEntry;

/// Cache-aligned wrapper to prevent false sharing between the enqueue and
/// dequeue cursors.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct Slot {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<LogEntry>>,
}

pub struct MpmcRing {
    slots: Box<[Slot]>,
    mask: usize,
    enqueue_pos: CacheAligned<AtomicUsize>,
    dequeue_pos: CacheAligned<AtomicUsize>,
}

// SAFETY: slot ownership is handed off through the per-cell sequence numbers;
// a producer writes a slot only after claiming its position via CAS, and a
// consumer reads it only after the producer's release store of seq.
unsafe impl Send for MpmcRing {}
unsafe impl Sync for MpmcRing {}

impl MpmcRing {
    /// Create a ring with `2^exponent` slots.
    pub fn with_capacity_pow2(exponent: u32) -> Self {
        let capacity = 1usize << exponent;
        let slots: Vec<Slot> = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            enqueue_pos: CacheAligned(AtomicUsize::new(0)),
            dequeue_pos: CacheAligned(AtomicUsize::new(0)),
        }
    }

    /// Enqueue without blocking. Returns the record back to the caller when
    /// the ring is full.
    pub fn try_enqueue(&self, entry: LogEntry) -> Result<(), LogEntry> {
        let mut pos = self.enqueue_pos.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;

            if diff == 0 {
                match self.enqueue_pos.0.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(entry) };
                        slot.seq.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // the slot one lap behind is still occupied: full
                return Err(entry);
            } else {
                pos = self.enqueue_pos.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue a single record, or `None` when the ring is empty.
    pub fn try_dequeue(&self) -> Option<LogEntry> {
        let mut pos = self.dequeue_pos.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - (pos + 1) as isize;

            if diff == 0 {
                match self.dequeue_pos.0.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let entry = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq.store(pos + self.mask + 1, Ordering::Release);
                        return Some(entry);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Move up to `limit` records into `out`, preserving FIFO order per
    /// producer. Returns the number moved.
    pub fn try_dequeue_bulk(&self, out: &mut Vec<LogEntry>, limit: usize) -> usize {
        let mut moved = 0;
        while moved < limit {
            match self.try_dequeue() {
                Some(entry) => {
                    out.push(entry);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    /// Conservative emptiness check; may report non-empty spuriously while a
    /// dequeue is in flight.
    pub fn is_empty(&self) -> bool {
        let dequeue = self.dequeue_pos.0.load(Ordering::Acquire);
        let enqueue = self.enqueue_pos.0.load(Ordering::Acquire);
        dequeue >= enqueue
    }
}

impl Drop for MpmcRing {
    fn drop(&mut self) {
        // release the messages of any records never consumed
        while self.try_dequeue().is_some() {}
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lock-free single-producer single-consumer ring buffer.
//!
//! The ring backs both the byte-oriented sinks (as `Ring<u8>`) and the
//! entry-oriented client buffers (as `Ring<LogEntry>`). Capacity is rounded
//! up to the next power of two so slot indices reduce to a mask of the
//! monotonically increasing cursors.
//!
//! The ring itself never blocks and never overwrites: a write that does not
//! fit is rejected whole. Callers that need multiple producers must
//! serialize externally (the dispatcher holds the root lock around all
//! writes).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pad atomics to separate cache lines so the producer and consumer cursors
/// do not false-share.
#[repr(align(64))]
struct CacheAligned<T>(T);

pub struct Ring<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: u64,
    /// Next sequence number to write. Owned by the producer side.
    write: CacheAligned<AtomicU64>,
    /// Next sequence number to read. Owned by the consumer side.
    read: CacheAligned<AtomicU64>,
}

// SAFETY: the producer only writes slots in [read, write) from one thread at
// a time (callers serialize producers), the consumer only reads slots it has
// observed through the Release store of `write`, and a slot is never accessed
// concurrently from both sides because `write`/`read` never cross.
unsafe impl<T: Send> Sync for Ring<T> {}
unsafe impl<T: Send> Send for Ring<T> {}

impl<T> Ring<T> {
    /// Create a ring with at least `capacity` slots, rounded up to a power
    /// of two. A zero capacity gets one slot.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(cap);
        for _ in 0..cap {
            slots.push(UnsafeCell::new(None));
        }
        Ring {
            slots: slots.into_boxed_slice(),
            mask: (cap - 1) as u64,
            write: CacheAligned(AtomicU64::new(0)),
            read: CacheAligned(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        let w = self.write.0.load(Ordering::Acquire);
        let r = self.read.0.load(Ordering::Acquire);
        (w - r) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items that can be pushed before the ring is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Push one item. Fails (returning the item) when the ring is full;
    /// existing contents are never overwritten.
    pub fn push(&self, item: T) -> Result<(), T> {
        let w = self.write.0.load(Ordering::Relaxed);
        let r = self.read.0.load(Ordering::Acquire);
        if w - r >= self.slots.len() as u64 {
            return Err(item);
        }
        // SAFETY: slot `w` is outside [read, write), so the consumer cannot
        // touch it until the Release store below publishes it.
        unsafe {
            *self.slots[(w & self.mask) as usize].get() = Some(item);
        }
        self.write.0.store(w + 1, Ordering::Release);
        Ok(())
    }

    /// Pop the oldest item, or `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let r = self.read.0.load(Ordering::Relaxed);
        let w = self.write.0.load(Ordering::Acquire);
        if r >= w {
            return None;
        }
        // SAFETY: the Acquire load of `write` makes the producer's store to
        // this slot visible, and the producer will not reuse it until the
        // Release store below advances `read`.
        let item = unsafe { (*self.slots[(r & self.mask) as usize].get()).take() };
        self.read.0.store(r + 1, Ordering::Release);
        item
    }

    /// Discard everything currently queued. Consumer-side operation.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl Ring<u8> {
    /// All-or-nothing byte write: either the whole slice is queued and its
    /// length returned, or nothing is written and 0 is returned.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() || self.free() < data.len() {
            return 0;
        }
        for &b in data {
            // Cannot fail: free space was checked above and there is no
            // concurrent producer.
            let _ = self.push(b);
        }
        data.len()
    }

    /// Free bytes, i.e. the largest write that can currently succeed.
    pub fn available(&self) -> usize {
        self.free()
    }

    /// Bytes queued and not yet read.
    pub fn used(&self) -> usize {
        self.len()
    }

    /// Read up to `max` bytes into a fresh buffer.
    pub fn read_bytes(&self, max: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max.min(self.len()));
        while out.len() < max {
            match self.pop() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        out
    }
}

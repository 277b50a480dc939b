//! Sequence lock for small `Copy` records.
//!
//! Readers retry instead of blocking; writers must already hold an
//! external mutex (the TLB's per-shard lock), so the sequence counter
//! only has to order one writer against many readers.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, Ordering};

pub struct SeqLock<T: Copy> {
    seq: AtomicU32,
    data: UnsafeCell<T>,
}

// SAFETY: readers only observe `data` through volatile copies validated
// by the sequence counter; writers are serialized externally.
unsafe impl<T: Copy + Send> Sync for SeqLock<T> {}
unsafe impl<T: Copy + Send> Send for SeqLock<T> {}

impl<T: Copy> SeqLock<T> {
    pub fn new(value: T) -> SeqLock<T> {
        SeqLock {
            seq: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Lock-free snapshot; spins while a write is in flight.
    pub fn read(&self) -> T {
        loop {
            let start = self.seq.load(Ordering::Acquire);
            if start & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: torn reads are possible here; the sequence check
            // below rejects them before the value escapes.
            let value = unsafe { ptr::read_volatile(self.data.get()) };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == start {
                return value;
            }
        }
    }

    /// Read-modify-write. Caller must hold the shard's writer mutex.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        // SAFETY: single writer by contract; readers tolerate the
        // intermediate state via the odd sequence number.
        let mut value = unsafe { ptr::read(self.data.get()) };
        f(&mut value);
        let start = self.seq.load(Ordering::Relaxed);
        self.seq.store(start.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        unsafe { ptr::write_volatile(self.data.get(), value) };
        self.seq.store(start.wrapping_add(2), Ordering::Release);
    }
}

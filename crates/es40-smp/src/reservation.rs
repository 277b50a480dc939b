//! Per-CPU load-locked reservations at cache-line (64-byte) granularity.
//!
//! The owning CPU's set/check path is single-writer and branch-cheap;
//! cross-CPU breaks are plain relaxed stores. Losing a race here only
//! ever clears a reservation that a concurrent write was entitled to
//! clear anyway.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use es40_types::{CpuId, CACHE_LINE_MASK};

struct Slot {
    line: AtomicU64,
    valid: AtomicBool,
}

pub struct ReservationFile {
    slots: Vec<Slot>,
}

impl ReservationFile {
    pub fn new(cpu_count: usize) -> ReservationFile {
        ReservationFile {
            slots: (0..cpu_count)
                .map(|_| Slot {
                    line: AtomicU64::new(0),
                    valid: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    /// LDx_L: records the cache line containing `pa`.
    pub fn set(&self, cpu: CpuId, pa: u64) {
        let slot = &self.slots[cpu];
        slot.line.store(pa & CACHE_LINE_MASK, Ordering::Relaxed);
        slot.valid.store(true, Ordering::Release);
    }

    /// STx_C: true iff the reservation is still held for `pa`'s line.
    /// Always consumes the reservation.
    pub fn check_and_clear(&self, cpu: CpuId, pa: u64) -> bool {
        let slot = &self.slots[cpu];
        let hit = slot.valid.load(Ordering::Acquire)
            && slot.line.load(Ordering::Relaxed) == pa & CACHE_LINE_MASK;
        slot.valid.store(false, Ordering::Release);
        hit
    }

    /// Drops `cpu`'s reservation unconditionally (context switch, REI).
    pub fn clear(&self, cpu: CpuId) {
        self.slots[cpu].valid.store(false, Ordering::Release);
    }

    /// Any write to a line breaks every CPU's reservation on it.
    pub fn break_on_line(&self, pa: u64) {
        let line = pa & CACHE_LINE_MASK;
        for slot in &self.slots {
            if slot.valid.load(Ordering::Relaxed) && slot.line.load(Ordering::Relaxed) == line {
                slot.valid.store(false, Ordering::Relaxed);
            }
        }
    }

    /// The line currently reserved by `cpu`, if any.
    pub fn held_line(&self, cpu: CpuId) -> Option<u64> {
        let slot = &self.slots[cpu];
        slot.valid
            .load(Ordering::Acquire)
            .then(|| slot.line.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_check_clear_cycle() {
        let r = ReservationFile::new(2);
        r.set(0, 0x1008);
        assert_eq!(r.held_line(0), Some(0x1000));
        assert!(r.check_and_clear(0, 0x1038)); // same 64-byte line
        // Consumed by the check.
        assert!(!r.check_and_clear(0, 0x1008));
    }

    #[test]
    fn different_line_fails_and_still_consumes() {
        let r = ReservationFile::new(1);
        r.set(0, 0x2000);
        assert!(!r.check_and_clear(0, 0x2040));
        assert!(!r.check_and_clear(0, 0x2000));
    }

    #[test]
    fn writes_break_all_matching_reservations() {
        let r = ReservationFile::new(4);
        r.set(0, 0x4000);
        r.set(1, 0x4020);
        r.set(2, 0x8000);
        r.break_on_line(0x4010);
        assert_eq!(r.held_line(0), None);
        assert_eq!(r.held_line(1), None);
        assert_eq!(r.held_line(2), Some(0x8000));
    }
}

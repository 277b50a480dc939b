//! External-interrupt routing.
//!
//! Each CPU has a 32-bit pending mask, one bit per IPL, plus a latched
//! `(source, vector)` word per level. Posting is a fetch-or; claiming
//! atomically clears the highest pending level above the CPU's current
//! IPL. Two sources posting at the same level collapse to the latest,
//! which matches level-sensitive platform interrupt semantics: the
//! handler rescans its controller anyway.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use es40_types::{CpuId, Ipl};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqClaim {
    pub ipl: Ipl,
    pub vector: u32,
    pub source: u32,
}

struct CpuIrqState {
    pending: AtomicU32,
    latched: [AtomicU64; 32],
}

impl CpuIrqState {
    fn new() -> CpuIrqState {
        CpuIrqState {
            pending: AtomicU32::new(0),
            latched: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

pub struct IrqRouter {
    cpus: Vec<CpuIrqState>,
}

impl IrqRouter {
    pub fn new(cpu_count: usize) -> IrqRouter {
        IrqRouter {
            cpus: (0..cpu_count).map(|_| CpuIrqState::new()).collect(),
        }
    }

    pub fn post(&self, cpu: CpuId, source: u32, ipl: Ipl, vector: u32) {
        let st = &self.cpus[cpu];
        st.latched[ipl as usize].store(
            ((source as u64) << 32) | vector as u64,
            Ordering::Release,
        );
        st.pending.fetch_or(1 << ipl, Ordering::AcqRel);
    }

    /// One-load hot-path check: anything pending strictly above
    /// `current_ipl`?
    pub fn has_deliverable(&self, cpu: CpuId, current_ipl: Ipl) -> bool {
        if current_ipl >= 31 {
            return false;
        }
        self.cpus[cpu].pending.load(Ordering::Acquire) >> (current_ipl + 1) != 0
    }

    /// Atomically claims the highest pending level above `current_ipl`.
    pub fn claim_next(&self, cpu: CpuId, current_ipl: Ipl) -> Option<IrqClaim> {
        let st = &self.cpus[cpu];
        loop {
            let pending = st.pending.load(Ordering::Acquire);
            let above = if current_ipl >= 31 {
                0
            } else {
                pending & (u32::MAX << (current_ipl + 1))
            };
            if above == 0 {
                return None;
            }
            let ipl = 31 - above.leading_zeros() as Ipl;
            if st
                .pending
                .compare_exchange_weak(
                    pending,
                    pending & !(1u32 << ipl),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                continue;
            }
            let latched = st.latched[ipl as usize].load(Ordering::Acquire);
            return Some(IrqClaim {
                ipl,
                vector: latched as u32,
                source: (latched >> 32) as u32,
            });
        }
    }

    /// Drops a pending level without delivering it (interrupt source
    /// deasserted, or HW_INT_CLR written by PAL).
    pub fn retract(&self, cpu: CpuId, ipl: Ipl) {
        self.cpus[cpu].pending.fetch_and(!(1u32 << ipl), Ordering::AcqRel);
    }
}

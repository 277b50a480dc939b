//! Hardware process control block: the canonical save area filled at
//! PAL entry and drained by REI/HW_RET.

use super::ps::ProcStatus;
use es40_types::Mode;

pub struct Hwpcb {
    /// Return PC for the in-flight PAL excursion.
    pub saved_pc: u64,
    pub saved_ps: ProcStatus,
    /// The PAL-shadowed integer subset (R4..R7, R20..R23) at entry.
    pub saved_regs: [u64; 8],
    /// Physical base of the level-0 page table.
    pub ptbr: u64,
    pub asn: u8,
    /// Cycle-counter snapshot at entry.
    pub cc: u64,
    /// Per-mode stack pointers swapped by context-switch PAL flows.
    pub ksp: u64,
    pub usp: u64,
    pub esp: u64,
    pub ssp: u64,
    pub fen: bool,
}

impl Hwpcb {
    pub fn new() -> Hwpcb {
        Hwpcb {
            saved_pc: 0,
            saved_ps: ProcStatus {
                cm: Mode::Kernel,
                ipl: 31,
            },
            saved_regs: [0; 8],
            ptbr: 0,
            asn: 0,
            cc: 0,
            ksp: 0,
            usp: 0,
            esp: 0,
            ssp: 0,
            fen: true,
        }
    }
}

impl Default for Hwpcb {
    fn default() -> Self {
        Hwpcb::new()
    }
}

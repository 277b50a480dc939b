//! Address translation: the per-CPU split TLB (I-stream and banked
//! D-stream arrays), page-table entries, the three-level page walker,
//! and superpage windows.
//!
//! Concurrency discipline: lookups are seqlocked per way and never block;
//! fills and invalidations serialize on a per-shard mutex. The two
//! invalidation axes (global epoch, per-ASN epoch) are plain atomic
//! counters, so TBIA/TBIAP are O(1) and stale entries die lazily.

pub mod pte;
pub mod replace;
pub mod seqlock;
pub mod tlb;
pub mod walk;

pub use pte::{PageSize, Pte, PteBits};
pub use replace::ReplacementPolicy;
pub use tlb::{LookupResult, Tlb, TlbEntry, SHARDS, WAYS};
pub use walk::{walk, WalkFailure, WalkParams};

/// EV6 superpage windows, gated by the SPE field of I_CTL/M_CTL.
///
/// Bit 2: VA<47:46> = 0b10 maps the low 44 bits directly to physical.
/// Bit 1: VA<47:41> = 0b1111110 maps the low 41 bits.
/// Bit 0: VA<47:30> = 0x3FFFE maps the low 30 bits.
///
/// The caller enforces the kernel-mode requirement.
pub fn superpage(va: u64, spe: u8) -> Option<u64> {
    let va48 = va & 0x0000_FFFF_FFFF_FFFF;
    if spe & 0b100 != 0 && (va48 >> 46) == 0b10 {
        return Some(va48 & 0x0000_0FFF_FFFF_FFFF);
    }
    if spe & 0b010 != 0 && (va48 >> 41) == 0b111_1110 {
        return Some(va48 & 0x0000_01FF_FFFF_FFFF);
    }
    if spe & 0b001 != 0 && (va48 >> 30) == 0x3FFFE {
        return Some(va48 & 0x3FFF_FFFF);
    }
    None
}

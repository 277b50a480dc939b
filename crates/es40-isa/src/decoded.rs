//! The decoded-instruction record: one instruction's fingerprint after
//! grain resolution, stored by value in the decode caches and read-only
//! afterwards.

use crate::grain::{Grain, GrainFlags, GrainId};
use crate::word;

#[derive(Clone, Copy, Debug)]
pub struct DecodedInstruction {
    pub raw: u32,
    /// Virtual PC the word was fetched at.
    pub va: u64,
    /// Physical address it decoded from; guards the PC-indexed cache
    /// against page remaps.
    pub pa: u64,
    pub grain: GrainId,
    /// Semantic flags copied from the grain for single-probe hot checks.
    pub flags: GrainFlags,
    pub ra: u8,
    pub rb: u8,
    pub rc: u8,
    pub lit: u8,
    pub uses_lit: bool,
    pub mem_disp: i16,
    pub br_disp: i32,
    /// Raw 11-bit FP function field (rounding/trap qualifiers intact).
    pub fn11: u16,
    /// CALL_PAL 26-bit function.
    pub pal_func: u32,
}

impl DecodedInstruction {
    pub fn new(raw: u32, va: u64, pa: u64, id: GrainId, grain: &Grain) -> DecodedInstruction {
        let uses_lit = grain.flags.contains(GrainFlags::LIT_OK) && word::has_literal(raw);
        DecodedInstruction {
            raw,
            va,
            pa,
            grain: id,
            flags: grain.flags,
            ra: word::ra(raw),
            rb: word::rb(raw),
            rc: word::rc(raw),
            lit: word::literal(raw),
            uses_lit,
            mem_disp: word::mem_disp(raw),
            br_disp: word::br_disp(raw),
            fn11: word::fp_func(raw),
            pal_func: word::pal_func(raw),
        }
    }

    /// Branch target for displacement branches.
    pub fn branch_target(&self) -> u64 {
        self.va
            .wrapping_add(4)
            .wrapping_add((self.br_disp as i64 as u64) << 2)
    }
}

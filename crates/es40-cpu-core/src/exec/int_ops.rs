//! Integer ALU: arithmetic, logicals, shifts, byte manipulation,
//! compares, conditional moves, counts, and the multimedia byte/word
//! min/max family.

use es40_isa::IntOp;

use crate::core::CpuCore;
use crate::fault::Fault;
use crate::pal::PalVariant;
use crate::pipeline::Slot;

/// AMASK feature bits this implementation supports: BWX, FIX, CIX, MVI.
const AMASK_FEATURES: u64 = 0x0000_0107;

/// EXC_SUM<IOV>.
const EXC_SUM_IOV: u64 = 1 << 6;

fn sext32(v: u64) -> u64 {
    v as u32 as i32 as i64 as u64
}

fn byte_mask(size: u32, bn: u32) -> u64 {
    let m: u64 = match size {
        1 => 0xFF,
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => u64::MAX,
    };
    if bn >= 8 {
        0
    } else {
        m.wrapping_shl(bn * 8)
    }
}

pub fn execute(core: &mut CpuCore, slot: &mut Slot, op: IntOp) {
    let di = slot.di;
    let a = core.state.regs.read(di.ra);
    let b = if di.uses_lit {
        di.lit as u64
    } else {
        core.state.regs.read(di.rb)
    };
    let bn = (b & 7) as u32;
    let disp = di.mem_disp as i64 as u64;
    let ovf_enabled = core.state.iprs.overflow_traps_enabled();

    let mut trap_overflow = false;
    let value = match op {
        IntOp::Lda => b.wrapping_add(disp),
        IntOp::Ldah => b.wrapping_add(disp << 16),

        IntOp::Addl => sext32(a.wrapping_add(b)),
        IntOp::Addq => a.wrapping_add(b),
        IntOp::Subl => sext32(a.wrapping_sub(b)),
        IntOp::Subq => a.wrapping_sub(b),
        IntOp::Addlv => {
            let (r, o) = (a as u32 as i32).overflowing_add(b as u32 as i32);
            trap_overflow = o;
            r as i64 as u64
        }
        IntOp::Addqv => {
            let (r, o) = (a as i64).overflowing_add(b as i64);
            trap_overflow = o;
            r as u64
        }
        IntOp::Sublv => {
            let (r, o) = (a as u32 as i32).overflowing_sub(b as u32 as i32);
            trap_overflow = o;
            r as i64 as u64
        }
        IntOp::Subqv => {
            let (r, o) = (a as i64).overflowing_sub(b as i64);
            trap_overflow = o;
            r as u64
        }

        IntOp::S4addl => sext32((a << 2).wrapping_add(b)),
        IntOp::S4addq => (a << 2).wrapping_add(b),
        IntOp::S4subl => sext32((a << 2).wrapping_sub(b)),
        IntOp::S4subq => (a << 2).wrapping_sub(b),
        IntOp::S8addl => sext32((a << 3).wrapping_add(b)),
        IntOp::S8addq => (a << 3).wrapping_add(b),
        IntOp::S8subl => sext32((a << 3).wrapping_sub(b)),
        IntOp::S8subq => (a << 3).wrapping_sub(b),

        IntOp::Mull => {
            let r = (a as u32 as i32 as i64).wrapping_mul(b as u32 as i32 as i64);
            sext32(r as u64)
        }
        IntOp::Mullv => {
            let r = (a as u32 as i32 as i64) * (b as u32 as i32 as i64);
            trap_overflow = r != (r as i32 as i64);
            sext32(r as u64)
        }
        IntOp::Mulq => a.wrapping_mul(b),
        IntOp::Mulqv => {
            let r = (a as i64 as i128) * (b as i64 as i128);
            trap_overflow = r != (r as i64 as i128);
            r as u64
        }
        IntOp::Umulh => (((a as u128) * (b as u128)) >> 64) as u64,

        IntOp::Cmpeq => (a == b) as u64,
        IntOp::Cmplt => ((a as i64) < b as i64) as u64,
        IntOp::Cmple => (a as i64 <= b as i64) as u64,
        IntOp::Cmpult => (a < b) as u64,
        IntOp::Cmpule => (a <= b) as u64,
        IntOp::Cmpbge => {
            let mut r = 0u64;
            for i in 0..8 {
                let ab = (a >> (i * 8)) as u8;
                let bb = (b >> (i * 8)) as u8;
                if ab >= bb {
                    r |= 1 << i;
                }
            }
            r
        }

        IntOp::And => a & b,
        IntOp::Bic => a & !b,
        IntOp::Bis => a | b,
        IntOp::Ornot => a | !b,
        IntOp::Xor => a ^ b,
        IntOp::Eqv => a ^ !b,

        IntOp::Cmoveq
        | IntOp::Cmovne
        | IntOp::Cmovlt
        | IntOp::Cmovge
        | IntOp::Cmovle
        | IntOp::Cmovgt
        | IntOp::Cmovlbs
        | IntOp::Cmovlbc => {
            let cond = match op {
                IntOp::Cmoveq => a == 0,
                IntOp::Cmovne => a != 0,
                IntOp::Cmovlt => (a as i64) < 0,
                IntOp::Cmovge => a as i64 >= 0,
                IntOp::Cmovle => a as i64 <= 0,
                IntOp::Cmovgt => a as i64 > 0,
                IntOp::Cmovlbs => a & 1 != 0,
                _ => a & 1 == 0,
            };
            if !cond {
                return; // no writeback at all
            }
            b
        }

        IntOp::Amask => b & !AMASK_FEATURES,
        IntOp::Implver => match core.shared.pal_variant {
            PalVariant::Ev5 => 1,
            PalVariant::Ev6 => 2,
        },

        IntOp::Sll => a.wrapping_shl((b & 63) as u32),
        IntOp::Srl => a.wrapping_shr((b & 63) as u32),
        IntOp::Sra => ((a as i64).wrapping_shr((b & 63) as u32)) as u64,

        IntOp::Zap => {
            let mut r = a;
            for i in 0..8 {
                if b & (1 << i) != 0 {
                    r &= !(0xFFu64 << (i * 8));
                }
            }
            r
        }
        IntOp::Zapnot => {
            let mut r = 0;
            for i in 0..8 {
                if b & (1 << i) != 0 {
                    r |= a & (0xFFu64 << (i * 8));
                }
            }
            r
        }

        IntOp::Extbl => (a >> (bn * 8)) & 0xFF,
        IntOp::Extwl => (a >> (bn * 8)) & 0xFFFF,
        IntOp::Extll => (a >> (bn * 8)) & 0xFFFF_FFFF,
        IntOp::Extql => a >> (bn * 8),
        IntOp::Extwh => (a.wrapping_shl((64 - bn * 8) & 63)) & 0xFFFF,
        IntOp::Extlh => (a.wrapping_shl((64 - bn * 8) & 63)) & 0xFFFF_FFFF,
        IntOp::Extqh => a.wrapping_shl((64 - bn * 8) & 63),

        IntOp::Insbl => (a & 0xFF) << (bn * 8),
        IntOp::Inswl => (a & 0xFFFF).wrapping_shl(bn * 8),
        IntOp::Insll => (a & 0xFFFF_FFFF).wrapping_shl(bn * 8),
        IntOp::Insql => a.wrapping_shl(bn * 8),
        IntOp::Inswh => {
            if bn == 0 {
                0
            } else {
                (a & 0xFFFF) >> (64 - bn * 8)
            }
        }
        IntOp::Inslh => {
            if bn == 0 {
                0
            } else {
                (a & 0xFFFF_FFFF) >> (64 - bn * 8)
            }
        }
        IntOp::Insqh => {
            if bn == 0 {
                0
            } else {
                a >> (64 - bn * 8)
            }
        }

        IntOp::Mskbl => a & !byte_mask(1, bn),
        IntOp::Mskwl => a & !byte_mask(2, bn),
        IntOp::Mskll => a & !byte_mask(4, bn),
        IntOp::Mskql => a & !byte_mask(8, bn),
        IntOp::Mskwh => a & !high_mask(2, bn),
        IntOp::Msklh => a & !high_mask(4, bn),
        IntOp::Mskqh => a & !high_mask(8, bn),

        IntOp::Sextb => b as u8 as i8 as i64 as u64,
        IntOp::Sextw => b as u16 as i16 as i64 as u64,
        IntOp::Ctpop => (b.count_ones()) as u64,
        IntOp::Ctlz => (b.leading_zeros()) as u64,
        IntOp::Cttz => (b.trailing_zeros()) as u64,

        IntOp::Perr => {
            let mut sum = 0u64;
            for i in 0..8 {
                let ab = (a >> (i * 8)) as u8;
                let bb = (b >> (i * 8)) as u8;
                sum += ab.abs_diff(bb) as u64;
            }
            sum
        }
        IntOp::Pklb => (b & 0xFF) | ((b >> 24) & 0xFF00),
        IntOp::Pkwb => {
            (b & 0xFF) | ((b >> 8) & 0xFF00) | ((b >> 16) & 0xFF_0000) | ((b >> 24) & 0xFF00_0000)
        }
        IntOp::Unpkbl => (b & 0xFF) | ((b & 0xFF00) << 24),
        IntOp::Unpkbw => {
            (b & 0xFF)
                | ((b & 0xFF00) << 8)
                | ((b & 0xFF_0000) << 16)
                | ((b & 0xFF00_0000) << 24)
        }

        IntOp::Minub8 | IntOp::Minsb8 | IntOp::Maxub8 | IntOp::Maxsb8 => {
            let mut r = 0u64;
            for i in 0..8 {
                let ab = (a >> (i * 8)) as u8;
                let bb = (b >> (i * 8)) as u8;
                let v = match op {
                    IntOp::Minub8 => ab.min(bb),
                    IntOp::Maxub8 => ab.max(bb),
                    IntOp::Minsb8 => (ab as i8).min(bb as i8) as u8,
                    _ => (ab as i8).max(bb as i8) as u8,
                };
                r |= (v as u64) << (i * 8);
            }
            r
        }
        IntOp::Minuw4 | IntOp::Minsw4 | IntOp::Maxuw4 | IntOp::Maxsw4 => {
            let mut r = 0u64;
            for i in 0..4 {
                let aw = (a >> (i * 16)) as u16;
                let bw = (b >> (i * 16)) as u16;
                let v = match op {
                    IntOp::Minuw4 => aw.min(bw),
                    IntOp::Maxuw4 => aw.max(bw),
                    IntOp::Minsw4 => (aw as i16).min(bw as i16) as u16,
                    _ => (aw as i16).max(bw as i16) as u16,
                };
                r |= (v as u64) << (i * 16);
            }
            r
        }

        IntOp::Ftoit => core.state.fregs.read(di.ra),
        IntOp::Ftois => {
            let s = crate::exec::fp_rep::s_reg_to_mem(core.state.fregs.read(di.ra));
            s as i32 as i64 as u64
        }
    };

    if trap_overflow && ovf_enabled {
        slot.fault = Some(Fault::Arith {
            exc_sum: EXC_SUM_IOV,
        });
        return;
    }
    slot.write_int(di.rc, value);
}

fn high_mask(size: u32, bn: u32) -> u64 {
    let m: u64 = match size {
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => u64::MAX,
    };
    if bn == 0 {
        0
    } else {
        m >> (64 - bn * 8)
    }
}

//! Memory unit: loads, stores, load-locked/store-conditional, the
//! barrier and cache-hint misc ops, and the PAL-mode HW_LD/HW_ST
//! accesses.

use es40_isa::{word, MemOp, MiscOp};

use crate::core::CpuCore;
use crate::outcome::Effects;
use crate::pipeline::Slot;

use super::fp_rep;

fn sext32(v: u64) -> u64 {
    v as u32 as i32 as i64 as u64
}

pub fn execute(core: &mut CpuCore, slot: &mut Slot, op: MemOp) {
    let di = slot.di;
    let ea = core
        .state
        .regs
        .read(di.rb)
        .wrapping_add(di.mem_disp as i64 as u64);

    macro_rules! try_mem {
        ($e:expr) => {
            match $e {
                Ok(v) => v,
                Err(f) => {
                    slot.fault = Some(f);
                    return;
                }
            }
        };
    }

    match op {
        MemOp::Ldbu => {
            let v = try_mem!(core.read_data(ea, 1));
            slot.write_int(di.ra, v);
        }
        MemOp::Ldwu => {
            let v = try_mem!(core.read_data(ea, 2));
            slot.write_int(di.ra, v);
        }
        MemOp::Ldl => {
            let v = try_mem!(core.read_data(ea, 4));
            slot.write_int(di.ra, sext32(v));
        }
        MemOp::Ldq => {
            let v = try_mem!(core.read_data(ea, 8));
            slot.write_int(di.ra, v);
        }
        MemOp::LdqU => {
            let v = try_mem!(core.read_data(ea & !7, 8));
            slot.write_int(di.ra, v);
        }
        MemOp::LdlL | MemOp::LdqL => {
            let width: u32 = if op == MemOp::LdlL { 4 } else { 8 };
            let pa = try_mem!(core.translate_data_read(ea, width));
            let v = try_mem!(core.read_physical(pa, width));
            core.shared.reservations.set(core.id, pa);
            let v = if width == 4 { sext32(v) } else { v };
            slot.write_int(di.ra, v);
        }

        MemOp::Stb => try_mem!(core.write_data(ea, 1, core.state.regs.read(di.ra))),
        MemOp::Stw => try_mem!(core.write_data(ea, 2, core.state.regs.read(di.ra))),
        MemOp::Stl => try_mem!(core.write_data(ea, 4, core.state.regs.read(di.ra))),
        MemOp::Stq => try_mem!(core.write_data(ea, 8, core.state.regs.read(di.ra))),
        MemOp::StqU => try_mem!(core.write_data(ea & !7, 8, core.state.regs.read(di.ra))),

        MemOp::StlC | MemOp::StqC => {
            let width: u32 = if op == MemOp::StlC { 4 } else { 8 };
            let pa = try_mem!(core.translate_data_write(ea, width));
            let success = core.shared.reservations.check_and_clear(core.id, pa);
            if success {
                try_mem!(core.write_physical(pa, width, core.state.regs.read(di.ra)));
            }
            slot.write_int(di.ra, success as u64);
        }

        MemOp::Lds => {
            let v = try_mem!(core.read_data(ea, 4));
            slot.write_fp(di.ra, fp_rep::s_mem_to_reg(v as u32));
        }
        MemOp::Ldf => {
            let v = try_mem!(core.read_data(ea, 4));
            slot.write_fp(di.ra, fp_rep::f_mem_to_reg(v as u32));
        }
        MemOp::Ldt => {
            let v = try_mem!(core.read_data(ea, 8));
            slot.write_fp(di.ra, v);
        }
        MemOp::Ldg => {
            let v = try_mem!(core.read_data(ea, 8));
            slot.write_fp(di.ra, fp_rep::g_mem_to_reg(v));
        }
        MemOp::Sts => {
            let v = fp_rep::s_reg_to_mem(core.state.fregs.read(di.ra)) as u64;
            try_mem!(core.write_data(ea, 4, v));
        }
        MemOp::Stf => {
            let v = fp_rep::f_reg_to_mem(core.state.fregs.read(di.ra)) as u64;
            try_mem!(core.write_data(ea, 4, v));
        }
        MemOp::Stt => {
            try_mem!(core.write_data(ea, 8, core.state.fregs.read(di.ra)));
        }
        MemOp::Stg => {
            let v = fp_rep::g_reg_to_mem(core.state.fregs.read(di.ra));
            try_mem!(core.write_data(ea, 8, v));
        }
    }
}

/// Barrier and cache-hint functions of the misc opcode.
pub fn misc(_core: &mut CpuCore, slot: &mut Slot, op: MiscOp) {
    match op {
        MiscOp::Mb => {
            slot.effects |= Effects::MEMORY_BARRIER | Effects::DRAIN_WRITE_BUFFERS;
        }
        MiscOp::Wmb => {
            slot.effects |= Effects::WRITE_BARRIER | Effects::DRAIN_WRITE_BUFFERS;
        }
        // FETCH/FETCH_M/ECB/WH64 are prefetch and write-hint advice; an
        // interpreter has nothing to do.
        MiscOp::Fetch | MiscOp::FetchM | MiscOp::Ecb | MiscOp::Wh64 => {}
        _ => unreachable!("routed to the control unit"),
    }
}

/// HW_LD/HW_ST access types (bits [15:13] of the word).
const HW_TYPE_PHYS: u8 = 1;
const HW_TYPE_ALT: u8 = 2;

pub fn hw_mem(core: &mut CpuCore, slot: &mut Slot, is_load: bool) {
    let di = slot.di;
    let ea = core
        .state
        .regs
        .read(di.rb)
        .wrapping_add(word::hw_mem_disp(di.raw) as i64 as u64);
    let ty = word::hw_mem_type(di.raw);
    let width = if word::hw_mem_quad(di.raw) { 8 } else { 4 };

    let result = if is_load {
        let read = match ty {
            HW_TYPE_PHYS => core.read_physical(ea, width),
            HW_TYPE_ALT => {
                let mode = core.state.iprs.alt_mode;
                core.read_data_mode(ea, width, mode)
            }
            _ => core.read_data(ea, width),
        };
        match read {
            Ok(v) => {
                let v = if width == 4 { sext32(v) } else { v };
                slot.write_int(di.ra, v);
                Ok(())
            }
            Err(f) => Err(f),
        }
    } else {
        let v = core.state.regs.read(di.ra);
        match ty {
            HW_TYPE_PHYS => core.write_physical(ea, width, v),
            HW_TYPE_ALT => {
                let mode = core.state.iprs.alt_mode;
                core.write_data_mode(ea, width, v, mode)
            }
            _ => core.write_data(ea, width, v),
        }
    };
    if let Err(f) = result {
        slot.fault = Some(f);
    }
}

//! Branch/control unit: displacement branches, jumps, CALL_PAL
//! dispatch, HW_RET, and the counter/flag misc functions.

use es40_isa::{BrOp, JmpKind, MiscOp};
use es40_types::Mode;

use crate::core::CpuCore;
use crate::fault::{EventPayload, ExcClass, Fault, PendingEvent, Priority};
use crate::outcome::Effects;
use crate::pal;
use crate::pipeline::Slot;

const SIGN: u64 = 1 << 63;

/// CALL_PAL HALT.
const PAL_FUNC_HALT: u32 = 0x00;
/// CALL_PAL IMB (unprivileged I-stream barrier).
const PAL_FUNC_IMB: u32 = 0x86;

/// Halt code reported when the guest executes CALL_PAL HALT.
pub const HALT_CODE_CALL_PAL: u64 = 0x2;

fn fp_is_zero(v: u64) -> bool {
    v & !SIGN == 0
}

fn fp_is_neg(v: u64) -> bool {
    v & SIGN != 0 && !fp_is_zero(v)
}

pub fn branch(core: &mut CpuCore, slot: &mut Slot, op: BrOp) {
    let di = slot.di;
    let a = core.state.regs.read(di.ra);
    let fav = core.state.fregs.read(di.ra);

    let taken = match op {
        BrOp::Br | BrOp::Bsr => true,
        BrOp::Beq => a == 0,
        BrOp::Bne => a != 0,
        BrOp::Blt => (a as i64) < 0,
        BrOp::Ble => a as i64 <= 0,
        BrOp::Bgt => a as i64 > 0,
        BrOp::Bge => a as i64 >= 0,
        BrOp::Blbc => a & 1 == 0,
        BrOp::Blbs => a & 1 == 1,
        BrOp::Fbeq => fp_is_zero(fav),
        BrOp::Fbne => !fp_is_zero(fav),
        BrOp::Fblt => fp_is_neg(fav),
        BrOp::Fble => fp_is_neg(fav) || fp_is_zero(fav),
        BrOp::Fbgt => !fp_is_neg(fav) && !fp_is_zero(fav),
        BrOp::Fbge => !fp_is_neg(fav),
    };
    let target = di.branch_target();

    if matches!(op, BrOp::Br | BrOp::Bsr) {
        slot.write_int(di.ra, di.va.wrapping_add(4));
    }
    if taken {
        slot.redirect = Some(target);
    }
    if core.predictor.resolve(di.va, taken, target) {
        slot.effects |= Effects::MISPREDICT | Effects::FLUSH_PIPELINE;
    }
}

pub fn jump(core: &mut CpuCore, slot: &mut Slot, _kind: JmpKind) {
    let di = slot.di;
    // All four jump kinds have identical architectural behavior; the
    // kind bits are a predictor hint.
    let target = core.state.regs.read(di.rb) & !3;
    slot.write_int(di.ra, di.va.wrapping_add(4));
    slot.redirect = Some(target);
    if core.predictor.resolve(di.va, true, target) {
        slot.effects |= Effects::MISPREDICT | Effects::FLUSH_PIPELINE;
    }
}

pub fn call_pal(core: &mut CpuCore, slot: &mut Slot) {
    let di = slot.di;
    let func = di.pal_func;

    // One uniform 64-byte-stride vector space. The whole primary half
    // 0x00..0x7F is privileged; 0x80..0xBF is the unprivileged set.
    let privileged = func < 0x80;
    if func >= 0xC0 || (privileged && !core.state.pal_mode && core.state.ps.cm != Mode::Kernel) {
        slot.fault = Some(Fault::Opcdec);
        return;
    }

    if func == PAL_FUNC_HALT {
        core.state.halted = true;
        core.state.halt_code = HALT_CODE_CALL_PAL;
        slot.effects |= Effects::HALT;
        return;
    }

    // IMB: the decode caches die here, before PAL even runs, so the
    // first post-barrier fetch re-reads backing memory.
    if func == PAL_FUNC_IMB {
        core.caches.invalidate_all();
    }

    let ev = PendingEvent {
        class: ExcClass::CallPal,
        priority: Priority::Normal,
        pc: di.va.wrapping_add(4),
        va: 0,
        asn: core.state.asn,
        mode: core.state.ps.cm,
        payload: EventPayload::PalFunc(func),
    };
    core.fault.set_pending(ev);
    slot.effects |= Effects::ENTER_PAL | Effects::FLUSH_PIPELINE;
}

pub fn misc(core: &mut CpuCore, slot: &mut Slot, op: MiscOp) {
    let di = slot.di;
    match op {
        MiscOp::Rpcc => {
            slot.write_int(di.ra, core.state.iprs.cc_value());
        }
        MiscOp::Rc => {
            let old = core.state.intr_flag;
            core.state.intr_flag = false;
            slot.write_int(di.ra, old as u64);
        }
        MiscOp::Rs => {
            let old = core.state.intr_flag;
            core.state.intr_flag = true;
            slot.write_int(di.ra, old as u64);
        }
        MiscOp::Trapb | MiscOp::Excb => {
            // Trap barrier: with one instruction in flight any pending
            // arithmetic trap is already at the dispatcher; nothing to
            // drain.
            let _ = core.fault.has_arithmetic();
        }
        _ => unreachable!("routed to the memory unit"),
    }
}

pub fn hw_ret(core: &mut CpuCore, slot: &mut Slot) {
    let di = slot.di;
    let target = core.state.regs.read(di.rb);
    let out = pal::return_from(core, target);
    slot.redirect = Some(target & !3);
    slot.effects |= out.effects;
}

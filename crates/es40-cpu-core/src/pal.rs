//! The PAL dispatcher: exception-class to vector resolution, context
//! save into the HWPCB, argument packaging into R16..R21, and the
//! return path shared by HW_RET and REI.

use es40_types::{Mode, IPL_PAL};

use crate::core::CpuCore;
use crate::fault::{EventPayload, ExcClass, MchkReason, PendingEvent};
use crate::outcome::Outcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PalVariant {
    Ev5,
    Ev6,
}

/// Hardware-exception vector offset from PAL_BASE.
pub fn exception_vector(variant: PalVariant, class: ExcClass) -> u64 {
    match variant {
        PalVariant::Ev6 => match class {
            ExcClass::Reset => 0x000,
            ExcClass::MachineCheck => 0x080,
            ExcClass::Arith => 0x100,
            ExcClass::Interrupt => 0x180,
            // Fault-on events deliver at the single-miss vector with the
            // fault type flagged in MM_STAT.
            ExcClass::DtbMissSingle
            | ExcClass::FaultOnRead
            | ExcClass::FaultOnWrite
            | ExcClass::FaultOnExecute => 0x200,
            ExcClass::DtbMissDouble => 0x280,
            ExcClass::ItbMiss => 0x300,
            ExcClass::ItbAcv => 0x380,
            ExcClass::DtbAcv => 0x400,
            ExcClass::Unalign => 0x480,
            ExcClass::Opcdec => 0x500,
            ExcClass::Fen => 0x580,
            ExcClass::CallPal => unreachable!("CALL_PAL vectors by function"),
        },
        PalVariant::Ev5 => match class {
            ExcClass::Reset => 0x0000,
            ExcClass::ItbAcv => 0x0080,
            ExcClass::Interrupt => 0x0100,
            ExcClass::ItbMiss => 0x0180,
            ExcClass::DtbMissSingle
            | ExcClass::FaultOnRead
            | ExcClass::FaultOnWrite
            | ExcClass::FaultOnExecute => 0x0200,
            ExcClass::DtbMissDouble => 0x0280,
            ExcClass::Unalign => 0x0300,
            ExcClass::DtbAcv => 0x0380,
            ExcClass::MachineCheck => 0x0400,
            ExcClass::Opcdec => 0x0480,
            ExcClass::Arith => 0x0500,
            ExcClass::Fen => 0x0580,
            ExcClass::CallPal => unreachable!("CALL_PAL vectors by function"),
        },
    }
}

/// CALL_PAL entry point: 64-byte stride from PAL_BASE, low bit tagging
/// PAL mode. One formula for the whole space; the privileged half is
/// 0x00..0x7F, the unprivileged set 0x80..0xBF.
pub fn call_pal_entry(pal_base: u64, func: u32) -> u64 {
    pal_base + ((func as u64) << 6) | 1
}

/// Transfers control into PAL for `ev`. All observable ordering is:
/// context saved, arguments packaged, mode switched, PC redirected.
pub fn enter(core: &mut CpuCore, ev: PendingEvent) -> Outcome {
    // A machine check that hits while PAL is already handling one is a
    // double fault: give up and halt.
    if core.state.pal_mode && ev.class == ExcClass::MachineCheck {
        core.state.halted = true;
        core.state.halt_code = MchkReason::DoubleFault.code();
        return Outcome::none().halt();
    }

    save_context(core, &ev);
    stage_iprs(core, &ev);
    package_args(core, &ev);

    let entry = match ev.class {
        ExcClass::CallPal => {
            let func = match ev.payload {
                EventPayload::PalFunc(f) => f,
                _ => 0,
            };
            call_pal_entry(core.state.iprs.pal_base, func)
        }
        class => {
            core.state.iprs.pal_base | exception_vector(core.shared.pal_variant, class) | 1
        }
    };

    core.state.ps.cm = Mode::Kernel;
    if ev.class != ExcClass::CallPal {
        core.state.ps.ipl = core.state.ps.ipl.max(IPL_PAL);
        if let EventPayload::Interrupt { ipl, .. } = ev.payload {
            core.state.ps.ipl = core.state.ps.ipl.max(ipl);
        }
    }
    core.state.regs.shadow_active = core.state.iprs.shadow_enabled();
    core.state.jump_tagged(entry);
    core.state.scoreboard = 0;

    Outcome::none().enter_pal().redirect(entry)
}

fn save_context(core: &mut CpuCore, ev: &PendingEvent) {
    let state = &mut core.state;
    state.hwpcb.saved_pc = ev.pc;
    state.hwpcb.saved_ps = state.ps;
    state.hwpcb.asn = state.asn;
    state.hwpcb.cc = state.iprs.cc_value();
    state.hwpcb.fen = state.fpen;
    for (i, r) in [4u8, 5, 6, 7, 20, 21, 22, 23].into_iter().enumerate() {
        state.hwpcb.saved_regs[i] = state.regs.read_underlying(r);
    }
    state.iprs.exc_addr = ev.pc | state.pal_mode as u64;
}

fn stage_iprs(core: &mut CpuCore, ev: &PendingEvent) {
    let iprs = &mut core.state.iprs;
    match ev.payload {
        EventPayload::MemFault { access, is_write } => {
            iprs.fault_va = ev.va;
            // MM_STAT: fault type in the low bits, write flag in bit 0.
            let kind = match ev.class {
                ExcClass::FaultOnRead => 0x4,
                ExcClass::FaultOnWrite => 0x8,
                ExcClass::FaultOnExecute => 0xC,
                ExcClass::DtbAcv => 0x2,
                _ => 0x0,
            };
            iprs.mm_stat = (kind as u64) | is_write as u64;
            let _ = access;
        }
        EventPayload::Arith { exc_sum } => iprs.exc_sum = exc_sum,
        _ => {}
    }
}

/// Register argument packaging per fault class.
fn package_args(core: &mut CpuCore, ev: &PendingEvent) {
    let write = |core: &mut CpuCore, r: u8, v: u64| core.state.regs.write(r, v);
    match ev.payload {
        EventPayload::MemFault { is_write, .. } => {
            let fault_type = match ev.class {
                ExcClass::DtbMissSingle => 0,
                ExcClass::DtbMissDouble => 1,
                ExcClass::ItbMiss => 2,
                ExcClass::ItbAcv | ExcClass::DtbAcv => 3,
                ExcClass::Unalign => 4,
                ExcClass::FaultOnRead => 5,
                ExcClass::FaultOnWrite => 6,
                ExcClass::FaultOnExecute => 7,
                _ => 0xF,
            };
            write(core, 16, ev.va);
            write(core, 17, ev.asn as u64);
            write(core, 18, fault_type);
            write(core, 19, is_write as u64);
            write(core, 20, ev.pc);
        }
        EventPayload::Arith { exc_sum } => {
            write(core, 16, exc_sum);
            write(core, 17, ev.pc);
        }
        EventPayload::Interrupt { source, ipl, vector } => {
            write(core, 16, vector as u64);
            write(core, 17, ipl as u64);
            write(core, 18, ev.pc);
            write(core, 19, source as u64);
        }
        EventPayload::Ast { mode } => {
            write(core, 16, mode.bits() as u64);
            write(core, 17, ev.pc);
        }
        EventPayload::Mchk { reason, addr } => {
            write(core, 16, reason.code());
            write(core, 17, reason.code());
            write(core, 18, addr);
            write(core, 19, ev.pc);
        }
        // CALL_PAL: the caller's R16..R21 pass through untouched.
        EventPayload::PalFunc(_) | EventPayload::None => {}
    }
}

/// REI/HW_RET: restore context from the HWPCB and resume at `target`
/// (bit 0 of the target selects whether we stay in PAL mode).
pub fn return_from(core: &mut CpuCore, target: u64) -> Outcome {
    core.state.ps = core.state.hwpcb.saved_ps;
    core.state.asn = core.state.hwpcb.asn;
    core.state.fpen = core.state.hwpcb.fen;
    core.state.regs.shadow_active = false;
    core.shared.reservations.clear(core.id);
    core.state.jump_tagged(target);
    Outcome::none().flush().redirect(target)
}

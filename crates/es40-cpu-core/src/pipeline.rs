//! The one-slot pipeline: route a fetched instruction to its execute
//! unit, enforce precise-fault semantics, commit the writeback, advance
//! the PC.

use es40_isa::{Format, GrainFlags, MiscOp};

use crate::core::CpuCore;
use crate::exec::{ctrl_ops, fp_ops, int_ops, ipr_ops, mem_ops};
use crate::fault::Fault;
use crate::fetch::FetchResult;
use crate::outcome::{Effects, Outcome};

/// Single-instruction work unit passed through the stages.
pub struct Slot {
    pub di: es40_isa::DecodedInstruction,
    /// Integer payload to write back.
    pub result: u64,
    pub fp_result: u64,
    pub wb_int: bool,
    pub wb_fp: bool,
    pub wb_reg: u8,
    pub fault: Option<Fault>,
    pub redirect: Option<u64>,
    pub effects: Effects,
}

impl Slot {
    pub fn new(di: es40_isa::DecodedInstruction) -> Slot {
        Slot {
            di,
            result: 0,
            fp_result: 0,
            wb_int: false,
            wb_fp: false,
            wb_reg: 31,
            fault: None,
            redirect: None,
            effects: Effects::empty(),
        }
    }

    pub fn write_int(&mut self, reg: u8, value: u64) {
        self.wb_int = true;
        self.wb_reg = reg;
        self.result = value;
    }

    pub fn write_fp(&mut self, reg: u8, value: u64) {
        self.wb_fp = true;
        self.wb_reg = reg;
        self.fp_result = value;
    }
}

pub fn tick(core: &mut CpuCore, fetched: FetchResult) -> Outcome {
    let di = match fetched {
        FetchResult::Fault(f) => {
            let pc = core.state.pc();
            core.post_fault(f, pc);
            return Outcome::none().fault_dispatched();
        }
        FetchResult::Fetched(di) => di,
    };

    let mut slot = Slot::new(di);

    if di.flags.contains(GrainFlags::PAL_ONLY) && !core.state.pal_mode {
        slot.fault = Some(Fault::Opcdec);
    } else if di.flags.contains(GrainFlags::FP) && !core.state.fpen {
        slot.fault = Some(Fault::Fen);
    } else {
        let format = core.shared.registry.grain(di.grain).format;
        match format {
            Format::Operate(op) => int_ops::execute(core, &mut slot, op),
            Format::FpOperate(op) => fp_ops::execute(core, &mut slot, op),
            Format::Memory(op) => mem_ops::execute(core, &mut slot, op),
            Format::Branch(op) => ctrl_ops::branch(core, &mut slot, op),
            Format::Jump(kind) => ctrl_ops::jump(core, &mut slot, kind),
            Format::CallPal => ctrl_ops::call_pal(core, &mut slot),
            Format::Misc(op) => match op {
                MiscOp::Mb
                | MiscOp::Wmb
                | MiscOp::Fetch
                | MiscOp::FetchM
                | MiscOp::Ecb
                | MiscOp::Wh64 => mem_ops::misc(core, &mut slot, op),
                _ => ctrl_ops::misc(core, &mut slot, op),
            },
            Format::HwLoad => mem_ops::hw_mem(core, &mut slot, true),
            Format::HwStore => mem_ops::hw_mem(core, &mut slot, false),
            Format::HwMfpr => ipr_ops::mfpr(core, &mut slot),
            Format::HwMtpr => ipr_ops::mtpr(core, &mut slot),
            Format::HwRet => ctrl_ops::hw_ret(core, &mut slot),
        }
    }

    if (slot.wb_int || slot.wb_fp) && slot.wb_reg != 31 {
        core.state.scoreboard |= 1 << slot.wb_reg;
    }

    // A faulting slot is aborted before writeback: the register file is
    // untouched, only the scoreboard is cleared.
    if let Some(f) = slot.fault {
        core.state.scoreboard = 0;
        core.post_fault(f, di.va);
        return Outcome::none().fault_dispatched();
    }

    if slot.wb_reg != 31 {
        if slot.wb_int {
            core.state.regs.write(slot.wb_reg, slot.result);
        }
        if slot.wb_fp {
            core.state.fregs.write(slot.wb_reg, slot.fp_result);
        }
    }
    core.state.scoreboard = 0;

    match slot.redirect {
        Some(target) => core.state.set_pc(target),
        None => core.state.advance_pc(),
    }

    Outcome {
        effects: slot.effects,
        redirect: slot.redirect,
    }
}

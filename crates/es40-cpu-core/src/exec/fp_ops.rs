//! Floating-point ALU: IEEE S/T, VAX F/G (plus D conversions), FPCR
//! access, FP conditional moves, and the integer transfer ops.
//!
//! IEEE operations accumulate status into the FPCR and trap only when
//! the instruction carries a trap qualifier and the FPCR does not
//! disable the exception. VAX operations trap unconditionally, matching
//! the architecture's always-on VAX arithmetic faults.

use es40_isa::FpOp;

use crate::core::CpuCore;
use crate::fault::Fault;
use crate::pipeline::Slot;
use crate::state::fpcr::{Fpcr, FpExceptions, RoundingMode};

use super::fp_rep::{self, VaxError};

const SIGN: u64 = 1 << 63;
/// FP compare "true" result (2.0 in T format).
const CMP_TRUE: u64 = 0x4000_0000_0000_0000;

fn is_zero(v: u64) -> bool {
    v & !SIGN == 0
}

fn is_neg(v: u64) -> bool {
    v & SIGN != 0 && !is_zero(v)
}

struct FpCtx {
    exc: FpExceptions,
    vax: bool,
}

impl FpCtx {
    fn new(vax: bool) -> FpCtx {
        FpCtx {
            exc: FpExceptions::default(),
            vax,
        }
    }

    fn vax_operand(&mut self, r: u64) -> Result<f64, ()> {
        match fp_rep::vax_reg_to_host(r) {
            Ok(v) => Ok(v),
            Err(VaxError::ReservedOperand) => {
                self.exc.inv = true;
                Err(())
            }
            Err(VaxError::Overflow) => {
                self.exc.ovf = true;
                Err(())
            }
        }
    }

    fn vax_result(&mut self, v: f64) -> u64 {
        match fp_rep::host_to_vax_reg(v) {
            Ok(r) => r,
            Err(_) => {
                self.exc.ovf = true;
                0
            }
        }
    }

    fn t_bin(&mut self, a: f64, b: f64, div: bool, f: impl FnOnce(f64, f64) -> f64) -> f64 {
        if a.is_nan() || b.is_nan() {
            self.exc.inv = true;
        }
        if div && b == 0.0 && !a.is_nan() {
            if a == 0.0 {
                self.exc.inv = true;
            } else {
                self.exc.dze = true;
            }
        }
        let r = f(a, b);
        if r.is_nan() && !a.is_nan() && !b.is_nan() && !(div && b == 0.0) {
            self.exc.inv = true;
        }
        if r.is_infinite() && a.is_finite() && b.is_finite() && !(div && b == 0.0) {
            self.exc.ovf = true;
            self.exc.ine = true;
        }
        if r != 0.0 && r.is_subnormal() {
            self.exc.unf = true;
        }
        r
    }

    fn s_bin(&mut self, a: f32, b: f32, div: bool, f: impl FnOnce(f32, f32) -> f32) -> f32 {
        if a.is_nan() || b.is_nan() {
            self.exc.inv = true;
        }
        if div && b == 0.0 && !a.is_nan() {
            if a == 0.0 {
                self.exc.inv = true;
            } else {
                self.exc.dze = true;
            }
        }
        let r = f(a, b);
        if r.is_nan() && !a.is_nan() && !b.is_nan() && !(div && b == 0.0) {
            self.exc.inv = true;
        }
        if r.is_infinite() && a.is_finite() && b.is_finite() && !(div && b == 0.0) {
            self.exc.ovf = true;
            self.exc.ine = true;
        }
        if r != 0.0 && r.is_subnormal() {
            self.exc.unf = true;
        }
        r
    }
}

fn round_f64_to_i64(v: f64, mode: RoundingMode, exc: &mut FpExceptions) -> i64 {
    if v.is_nan() {
        exc.inv = true;
        return 0;
    }
    let rounded = match mode {
        RoundingMode::Chopped => v.trunc(),
        RoundingMode::MinusInf => v.floor(),
        RoundingMode::PlusInf => v.ceil(),
        RoundingMode::Nearest => {
            // Round half to even.
            let f = v.floor();
            let d = v - f;
            if d > 0.5 || (d == 0.5 && (f as i64) % 2 != 0) {
                f + 1.0
            } else {
                f
            }
        }
    };
    if rounded != v {
        exc.ine = true;
    }
    if rounded >= 9.223_372_036_854_776E18 || rounded < -9.223_372_036_854_776E18 {
        exc.iov = true;
        exc.ine = true;
    }
    rounded as i64
}

fn instruction_rounding(fn11: u16, fpcr: Fpcr) -> RoundingMode {
    match (fn11 >> 6) & 3 {
        0 => RoundingMode::Chopped,
        1 => RoundingMode::MinusInf,
        2 => RoundingMode::Nearest,
        _ => fpcr.dyn_rounding(),
    }
}

pub fn execute(core: &mut CpuCore, slot: &mut Slot, op: FpOp) {
    let di = slot.di;
    let fa = core.state.fregs.read(di.ra);
    let fb = core.state.fregs.read(di.rb);
    let at = f64::from_bits(fa);
    let bt = f64::from_bits(fb);
    let as_ = at as f32;
    let bs = bt as f32;
    let trap_qualified = (di.fn11 >> 8) & 7 != 0;
    let rounding = instruction_rounding(di.fn11, core.state.fpcr);

    let is_vax = matches!(
        op,
        FpOp::Addf
            | FpOp::Subf
            | FpOp::Mulf
            | FpOp::Divf
            | FpOp::Addg
            | FpOp::Subg
            | FpOp::Mulg
            | FpOp::Divg
            | FpOp::Cmpgeq
            | FpOp::Cmpglt
            | FpOp::Cmpgle
            | FpOp::Cvtgf
            | FpOp::Cvtgd
            | FpOp::Cvtdg
            | FpOp::Cvtgq
            | FpOp::Cvtqf
            | FpOp::Cvtqg
            | FpOp::Sqrtf
            | FpOp::Sqrtg
    );
    let mut ctx = FpCtx::new(is_vax);

    let value: Option<u64> = match op {
        // --- IEEE single ---
        FpOp::Adds => Some(widen(ctx.s_bin(as_, bs, false, |a, b| a + b))),
        FpOp::Subs => Some(widen(ctx.s_bin(as_, bs, false, |a, b| a - b))),
        FpOp::Muls => Some(widen(ctx.s_bin(as_, bs, false, |a, b| a * b))),
        FpOp::Divs => Some(widen(ctx.s_bin(as_, bs, true, |a, b| a / b))),

        // --- IEEE double ---
        FpOp::Addt => Some(ctx.t_bin(at, bt, false, |a, b| a + b).to_bits()),
        FpOp::Subt => Some(ctx.t_bin(at, bt, false, |a, b| a - b).to_bits()),
        FpOp::Mult => Some(ctx.t_bin(at, bt, false, |a, b| a * b).to_bits()),
        FpOp::Divt => Some(ctx.t_bin(at, bt, true, |a, b| a / b).to_bits()),

        FpOp::Cmptun => Some(if at.is_nan() || bt.is_nan() {
            CMP_TRUE
        } else {
            0
        }),
        FpOp::Cmpteq | FpOp::Cmptlt | FpOp::Cmptle => {
            if at.is_nan() || bt.is_nan() {
                ctx.exc.inv = true;
                Some(0)
            } else {
                let t = match op {
                    FpOp::Cmpteq => at == bt,
                    FpOp::Cmptlt => at < bt,
                    _ => at <= bt,
                };
                Some(if t { CMP_TRUE } else { 0 })
            }
        }

        // --- IEEE conversions ---
        FpOp::Cvtts => {
            if at.is_nan() {
                ctx.exc.inv = true;
            }
            let r = at as f32;
            if r.is_infinite() && at.is_finite() {
                ctx.exc.ovf = true;
                ctx.exc.ine = true;
            } else if (r as f64) != at && !at.is_nan() {
                ctx.exc.ine = true;
            }
            Some(widen(r))
        }
        // The S register image is already a valid T image; the
        // conversion is a register-format no-op.
        FpOp::Cvtst => Some(fb),
        FpOp::Cvttq => Some(round_f64_to_i64(bt, rounding, &mut ctx.exc) as u64),
        FpOp::Cvtqs => {
            let v = fb as i64;
            let r = v as f32;
            if (r as f64) != v as f64 {
                ctx.exc.ine = true;
            }
            Some(widen(r))
        }
        FpOp::Cvtqt => {
            let v = fb as i64;
            let r = v as f64;
            if r as i64 != v {
                ctx.exc.ine = true;
            }
            Some(r.to_bits())
        }

        // --- VAX arithmetic ---
        FpOp::Addf | FpOp::Subf | FpOp::Mulf | FpOp::Divf | FpOp::Addg | FpOp::Subg
        | FpOp::Mulg | FpOp::Divg => {
            let f_fmt = matches!(op, FpOp::Addf | FpOp::Subf | FpOp::Mulf | FpOp::Divf);
            match (ctx.vax_operand(fa), ctx.vax_operand(fb)) {
                (Ok(a), Ok(b)) => {
                    let div = matches!(op, FpOp::Divf | FpOp::Divg);
                    if div && b == 0.0 {
                        ctx.exc.dze = true;
                        Some(0)
                    } else {
                        let r = match op {
                            FpOp::Addf | FpOp::Addg => a + b,
                            FpOp::Subf | FpOp::Subg => a - b,
                            FpOp::Mulf | FpOp::Mulg => a * b,
                            _ => a / b,
                        };
                        let bits = ctx.vax_result(r);
                        if f_fmt {
                            match fp_rep::f_range_check(bits) {
                                Ok(b) => Some(b),
                                Err(_) => {
                                    ctx.exc.ovf = true;
                                    Some(0)
                                }
                            }
                        } else {
                            Some(bits)
                        }
                    }
                }
                _ => Some(0),
            }
        }

        FpOp::Cmpgeq | FpOp::Cmpglt | FpOp::Cmpgle => {
            match (ctx.vax_operand(fa), ctx.vax_operand(fb)) {
                (Ok(a), Ok(b)) => {
                    let t = match op {
                        FpOp::Cmpgeq => a == b,
                        FpOp::Cmpglt => a < b,
                        _ => a <= b,
                    };
                    Some(if t { CMP_TRUE } else { 0 })
                }
                _ => Some(0),
            }
        }

        FpOp::Cvtgf => match ctx.vax_operand(fb) {
            Ok(v) => {
                let bits = ctx.vax_result(v);
                match fp_rep::f_range_check(bits) {
                    Ok(b) => Some(b),
                    Err(_) => {
                        ctx.exc.ovf = true;
                        Some(0)
                    }
                }
            }
            Err(()) => Some(0),
        },
        FpOp::Cvtgq => match ctx.vax_operand(fb) {
            Ok(v) => Some(round_f64_to_i64(v, rounding, &mut ctx.exc) as u64),
            Err(()) => Some(0),
        },
        FpOp::Cvtqf => {
            let bits = ctx.vax_result(fb as i64 as f64);
            match fp_rep::f_range_check(bits) {
                Ok(b) => Some(b),
                Err(_) => {
                    ctx.exc.ovf = true;
                    Some(0)
                }
            }
        }
        FpOp::Cvtqg => Some(ctx.vax_result(fb as i64 as f64)),
        FpOp::Cvtdg => match fp_rep::d_reg_to_g_reg(fb) {
            Ok(r) => Some(r),
            Err(VaxError::ReservedOperand) => {
                ctx.exc.inv = true;
                Some(0)
            }
            Err(VaxError::Overflow) => {
                ctx.exc.ovf = true;
                Some(0)
            }
        },
        FpOp::Cvtgd => match fp_rep::g_reg_to_d_reg(fb) {
            Ok(r) => Some(r),
            Err(_) => {
                ctx.exc.ovf = true;
                Some(0)
            }
        },

        // --- Data movement ---
        FpOp::Cvtlq => {
            let v = ((fb >> 32) & 0xC000_0000) | ((fb >> 29) & 0x3FFF_FFFF);
            Some(v as u32 as i32 as i64 as u64)
        }
        FpOp::Cvtql => {
            let v = fb as i64;
            if trap_qualified && v != v as i32 as i64 {
                ctx.exc.iov = true;
            }
            Some(((fb & 0xC000_0000) << 32) | ((fb & 0x3FFF_FFFF) << 29))
        }
        FpOp::Cpys => Some((fa & SIGN) | (fb & !SIGN)),
        FpOp::Cpysn => Some(((fa ^ SIGN) & SIGN) | (fb & !SIGN)),
        FpOp::Cpyse => Some((fa & 0xFFF0_0000_0000_0000) | (fb & 0x000F_FFFF_FFFF_FFFF)),
        FpOp::MtFpcr => {
            core.state.fpcr = Fpcr(fa);
            None
        }
        FpOp::MfFpcr => Some(core.state.fpcr.0),

        FpOp::Fcmoveq
        | FpOp::Fcmovne
        | FpOp::Fcmovlt
        | FpOp::Fcmovge
        | FpOp::Fcmovle
        | FpOp::Fcmovgt => {
            let cond = match op {
                FpOp::Fcmoveq => is_zero(fa),
                FpOp::Fcmovne => !is_zero(fa),
                FpOp::Fcmovlt => is_neg(fa),
                FpOp::Fcmovge => !is_neg(fa),
                FpOp::Fcmovle => is_neg(fa) || is_zero(fa),
                _ => !is_neg(fa) && !is_zero(fa),
            };
            if cond {
                Some(fb)
            } else {
                None
            }
        }

        // --- Integer transfers and square roots ---
        FpOp::Itofs => Some(fp_rep::s_mem_to_reg(core.state.regs.read(di.ra) as u32)),
        FpOp::Itoff => Some(fp_rep::f_mem_to_reg(core.state.regs.read(di.ra) as u32)),
        FpOp::Itoft => Some(core.state.regs.read(di.ra)),
        FpOp::Sqrts => {
            if bs < 0.0 {
                ctx.exc.inv = true;
            }
            Some(widen(bs.sqrt()))
        }
        FpOp::Sqrtt => {
            if bt < 0.0 {
                ctx.exc.inv = true;
            }
            Some(bt.sqrt().to_bits())
        }
        FpOp::Sqrtf | FpOp::Sqrtg => match ctx.vax_operand(fb) {
            Ok(v) => {
                if v < 0.0 {
                    ctx.exc.inv = true;
                    Some(0)
                } else {
                    let bits = ctx.vax_result(v.sqrt());
                    if op == FpOp::Sqrtf {
                        match fp_rep::f_range_check(bits) {
                            Ok(b) => Some(b),
                            Err(_) => {
                                ctx.exc.ovf = true;
                                Some(0)
                            }
                        }
                    } else {
                        Some(bits)
                    }
                }
            }
            Err(()) => Some(0),
        },
    };

    core.state.fpcr.accumulate(ctx.exc);
    let traps = if ctx.vax {
        ctx.exc.any()
    } else {
        ctx.exc.any() && trap_qualified && core.state.fpcr.should_trap(ctx.exc)
    };
    if traps {
        slot.fault = Some(Fault::Arith {
            exc_sum: Fpcr::exc_sum_bits(ctx.exc),
        });
        return;
    }
    if let Some(v) = value {
        slot.write_fp(di.rc, v);
    }
}

fn widen(v: f32) -> u64 {
    (v as f64).to_bits()
}
